//! The operator catalog: seventeen byte-level transformations.
//!
//! Each operator validates its length precondition before drawing any
//! random positions, so a skip leaves both the buffer and the PRNG stream
//! recognisably aligned with the operator that declined.

use itertools::Itertools;

use super::{MutationCtx, MutationResult, MutationTags, Mutator};

/// Values worth planting whole: boundary and off-by-one magic numbers.
const INTERESTING8: &[i8] = &[-128, -1, 0, 1, 16, 32, 64, 100, 127];
const INTERESTING16: &[u16] = &[0, 128, 255, 256, 512, 1000, 1024, 4096, 32767, 65535];
const INTERESTING32: &[u32] = &[
    0,
    1,
    32768,
    65535,
    65536,
    100_663_045,
    2_147_483_647,
    4_294_967_295,
];

/// Two distinct indices in `[0, len)`. Caller guarantees `len >= 2`.
fn distinct_pair(ctx: &mut MutationCtx<'_>, len: usize) -> (usize, usize) {
    let src = ctx.rand.below(len);
    let mut dst = ctx.rand.below(len);
    while src == dst {
        dst = ctx.rand.below(len);
    }
    (src, dst)
}

#[derive(Debug)]
pub struct RemoveRange;

impl Mutator for RemoveRange {
    fn name(&self) -> &'static str {
        "remove a range of bytes"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::BYTE | MutationTags::REMOVE
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        if buf.len() < 2 {
            return MutationResult::Skipped;
        }
        let start = ctx.rand.below(buf.len());
        let count = ctx.rand.choose_len(buf.len() - start);
        buf.drain(start..start + count);
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct InsertBytes;

impl Mutator for InsertBytes {
    fn name(&self) -> &'static str {
        "insert random bytes"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::BYTE | MutationTags::INSERT
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        let pos = ctx.rand.below(buf.len() + 1);
        let count = ctx.rand.choose_len(10);
        let fresh: Vec<u8> = (0..count).map(|_| ctx.rand.below(256) as u8).collect();
        buf.splice(pos..pos, fresh);
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct DuplicateRange;

impl Mutator for DuplicateRange {
    fn name(&self) -> &'static str {
        "duplicate a range of bytes"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::BYTE | MutationTags::DUPLICATE
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        if buf.len() < 2 {
            return MutationResult::Skipped;
        }
        let (src, dst) = distinct_pair(ctx, buf.len());
        let count = ctx.rand.choose_len(buf.len() - src);
        let chunk = buf[src..src + count].to_vec();
        buf.splice(dst..dst, chunk);
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct CopyRange;

impl Mutator for CopyRange {
    fn name(&self) -> &'static str {
        "copy a range of bytes"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::BYTE | MutationTags::COPY
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        if buf.len() < 2 {
            return MutationResult::Skipped;
        }
        let (src, dst) = distinct_pair(ctx, buf.len());
        let count = ctx.rand.choose_len(buf.len() - src);
        let count = usize::min(count, buf.len() - dst);
        buf.copy_within(src..src + count, dst);
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct BitFlip;

impl Mutator for BitFlip {
    fn name(&self) -> &'static str {
        "flip a bit"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::BIT | MutationTags::REPLACE
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        if buf.is_empty() {
            return MutationResult::Skipped;
        }
        let pos = ctx.rand.below(buf.len());
        buf[pos] ^= 1 << ctx.rand.below(8);
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct RandomiseByte;

impl Mutator for RandomiseByte {
    fn name(&self) -> &'static str {
        "randomise a byte"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::BYTE | MutationTags::REPLACE
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        if buf.is_empty() {
            return MutationResult::Skipped;
        }
        let pos = ctx.rand.below(buf.len());
        // XOR with [1, 255] so the byte always changes.
        buf[pos] ^= ctx.rand.below(255) as u8 + 1;
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct SwapBytes;

impl Mutator for SwapBytes {
    fn name(&self) -> &'static str {
        "swap two bytes"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::BYTE | MutationTags::SWAP
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        if buf.len() < 2 {
            return MutationResult::Skipped;
        }
        let (src, dst) = distinct_pair(ctx, buf.len());
        buf.swap(src, dst);
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct AddSubByte;

impl Mutator for AddSubByte {
    fn name(&self) -> &'static str {
        "add/subtract from a byte"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::BYTE | MutationTags::ADDSUB
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        if buf.is_empty() {
            return MutationResult::Skipped;
        }
        let pos = ctx.rand.below(buf.len());
        let operand = ctx.rand.below(256) as u8;
        buf[pos] = buf[pos].wrapping_add(operand);
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct AddSubShort;

impl Mutator for AddSubShort {
    fn name(&self) -> &'static str {
        "add/subtract from a uint16"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::SHORT | MutationTags::ADDSUB
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        if buf.len() < 2 {
            return MutationResult::Skipped;
        }
        let pos = ctx.rand.below(buf.len() - 1);
        let operand = ctx.rand.next_u32() as u16;
        let packed = if ctx.rand.coinflip() {
            operand.to_be_bytes()
        } else {
            operand.to_le_bytes()
        };
        for (k, byte) in packed.iter().enumerate() {
            buf[pos + k] = buf[pos + k].wrapping_add(*byte);
        }
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct AddSubLong;

impl Mutator for AddSubLong {
    fn name(&self) -> &'static str {
        "add/subtract from a uint32"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::LONG | MutationTags::ADDSUB
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        if buf.len() < 4 {
            return MutationResult::Skipped;
        }
        let pos = ctx.rand.below(buf.len() - 3);
        let operand = ctx.rand.next_u32();
        let packed = if ctx.rand.coinflip() {
            operand.to_be_bytes()
        } else {
            operand.to_le_bytes()
        };
        for (k, byte) in packed.iter().enumerate() {
            buf[pos + k] = buf[pos + k].wrapping_add(*byte);
        }
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct AddSubLongLong;

impl Mutator for AddSubLongLong {
    fn name(&self) -> &'static str {
        "add/subtract from a uint64"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::LONGLONG | MutationTags::ADDSUB
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        if buf.len() < 8 {
            return MutationResult::Skipped;
        }
        let pos = ctx.rand.below(buf.len() - 7);
        let operand = (u64::from(ctx.rand.next_u32()) << 32) | u64::from(ctx.rand.next_u32());
        let packed = if ctx.rand.coinflip() {
            operand.to_be_bytes()
        } else {
            operand.to_le_bytes()
        };
        for (k, byte) in packed.iter().enumerate() {
            buf[pos + k] = buf[pos + k].wrapping_add(*byte);
        }
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct ReplaceInterestingByte;

impl Mutator for ReplaceInterestingByte {
    fn name(&self) -> &'static str {
        "replace a byte with an interesting value"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::BYTE | MutationTags::REPLACE
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        if buf.is_empty() {
            return MutationResult::Skipped;
        }
        let pos = ctx.rand.below(buf.len());
        buf[pos] = INTERESTING8[ctx.rand.below(INTERESTING8.len())] as u8;
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct ReplaceInterestingShort;

impl Mutator for ReplaceInterestingShort {
    fn name(&self) -> &'static str {
        "replace a uint16 with an interesting value"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::SHORT | MutationTags::REPLACE
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        if buf.len() < 2 {
            return MutationResult::Skipped;
        }
        let pos = ctx.rand.below(buf.len() - 1);
        let value = INTERESTING16[ctx.rand.below(INTERESTING16.len())];
        let packed = if ctx.rand.coinflip() {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        buf[pos..pos + 2].copy_from_slice(&packed);
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct ReplaceInterestingLong;

impl Mutator for ReplaceInterestingLong {
    fn name(&self) -> &'static str {
        "replace a uint32 with an interesting value"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::LONG | MutationTags::REPLACE
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        if buf.len() < 4 {
            return MutationResult::Skipped;
        }
        let pos = ctx.rand.below(buf.len() - 3);
        let value = INTERESTING32[ctx.rand.below(INTERESTING32.len())];
        let packed = if ctx.rand.coinflip() {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        buf[pos..pos + 4].copy_from_slice(&packed);
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct ReplaceAsciiDigit;

impl Mutator for ReplaceAsciiDigit {
    fn name(&self) -> &'static str {
        "replace an ascii digit with another digit"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::BYTE | MutationTags::ASCII | MutationTags::REPLACE
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        let digits: Vec<usize> = buf.iter().positions(|b| b.is_ascii_digit()).collect();
        if digits.is_empty() {
            return MutationResult::Skipped;
        }
        let pos = digits[ctx.rand.below(digits.len())];
        let was = buf[pos];
        loop {
            let now = b'0' + ctx.rand.below(10) as u8;
            if now != was {
                buf[pos] = now;
                return MutationResult::Mutated;
            }
        }
    }
}

#[derive(Debug)]
pub struct DictionaryInsert;

impl Mutator for DictionaryInsert {
    fn name(&self) -> &'static str {
        "insert a dictionary word"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::TEXT | MutationTags::DICTIONARY
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        let Some(word) = ctx.dict.pick(ctx.rand).map(<[u8]>::to_vec) else {
            return MutationResult::Skipped;
        };
        let pos = ctx.rand.below(buf.len() + 1);
        buf.splice(pos..pos, word);
        MutationResult::Mutated
    }
}

#[derive(Debug)]
pub struct DictionaryAppend;

impl Mutator for DictionaryAppend {
    fn name(&self) -> &'static str {
        "append a dictionary word"
    }

    fn tags(&self) -> MutationTags {
        MutationTags::DICTIONARY | MutationTags::APPEND
    }

    fn mutate(&self, ctx: &mut MutationCtx<'_>, buf: &mut Vec<u8>) -> MutationResult {
        let Some(word) = ctx.dict.pick(ctx.rand) else {
            return MutationResult::Skipped;
        };
        buf.extend_from_slice(word);
        MutationResult::Mutated
    }
}
