//! Randomness primitives for input generation.
//!
//! Every random draw in a fuzzing session flows through one [`RandSource`]
//! owned by the supervisor, so a fixed `--seed` replays the identical input
//! sequence on the same host.

use libafl_bolts::current_nanos;
use libafl_bolts::rands::{Rand, StdRand};

/// Uniform random primitives used by the corpus and the mutation operators.
///
/// Only [`next_u32`](Self::next_u32) is required; the derived helpers keep
/// the distribution contracts in one place. The trait is object safe so the
/// operator catalog can stay a plain list of trait objects.
pub trait RandSource {
    /// A fresh uniform 32-bit sample.
    fn next_u32(&mut self) -> u32;

    /// Uniform integer in `[0, n)`; `0` when `n <= 1`.
    fn below(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        self.next_u32() as usize % n
    }

    /// Fair coin toss.
    fn coinflip(&mut self) -> bool {
        self.next_u32() & 1 == 1
    }

    /// Returns `k` with probability `2^-(k+1)`: the leading-zero count of a
    /// fresh 32-bit sample. Heavily favors small values.
    fn rand_exp(&mut self) -> u32 {
        self.next_u32().leading_zeros()
    }

    /// Pick an edit length in `[1, n]`, biased towards short edits:
    /// 90% within 8 bytes, 9% within 32, the rest anywhere in range.
    fn choose_len(&mut self, n: usize) -> usize {
        match self.below(100) {
            0..=89 => self.below(usize::min(8, n)) + 1,
            90..=98 => self.below(usize::min(32, n)) + 1,
            _ => self.below(n) + 1,
        }
    }
}

/// Production source backed by the PRNG family LibAFL ships.
#[derive(Debug)]
pub struct EngineRand {
    inner: StdRand,
}

impl EngineRand {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: StdRand::with_seed(seed),
        }
    }

    pub fn from_clock() -> Self {
        Self::with_seed(current_nanos())
    }
}

impl RandSource for EngineRand {
    fn next_u32(&mut self) -> u32 {
        self.inner.next() as u32
    }
}
