//! In-process coverage tracing through SanitizerCoverage pc-guard hooks.
//!
//! The compiler emits a call to [`__sanitizer_cov_trace_pc_guard`] on every
//! instrumented edge when the consumer binary is built with
//! `-Cpasses=sancov-module` and trace-pc-guard enabled (see the README for
//! the full flag set). This module is the runtime those calls land in: a
//! fixed-size edge map plus an O(1) cardinality counter.
//!
//! Coverage is cumulative for the lifetime of the process and never reset
//! between inputs. The supervisor compares the reported cardinality against
//! its own high-water mark; any strictly greater value means the last input
//! reached an edge no earlier input did.

use std::sync::atomic::{AtomicU8, AtomicU32, AtomicUsize, Ordering};

/// Number of slots in the edge map. Guard indices wrap modulo this, the
/// same 64 KiB footprint AFL-style maps use.
pub const MAP_SIZE: usize = 1 << 16;

static EDGE_MAP: [AtomicU8; MAP_SIZE] = [const { AtomicU8::new(0) }; MAP_SIZE];
static EDGE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Next guard index to hand out; 0 is reserved to mean "not instrumented".
static NEXT_GUARD: AtomicU32 = AtomicU32::new(1);

/// Called by instrumented modules at startup with their guard table.
///
/// # Safety
/// `start`/`stop` delimit a live guard array provided by the compiler.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __sanitizer_cov_trace_pc_guard_init(mut start: *mut u32, stop: *mut u32) {
    if start == stop {
        return;
    }
    // SAFETY: the compiler hands us a valid [start, stop) guard range.
    unsafe {
        if *start != 0 {
            // This module has already been assigned indices.
            return;
        }
        while start < stop {
            *start = NEXT_GUARD.fetch_add(1, Ordering::Relaxed);
            start = start.add(1);
        }
    }
}

/// Called on every instrumented edge.
///
/// # Safety
/// `guard` points into a table previously passed to the init hook.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __sanitizer_cov_trace_pc_guard(guard: *mut u32) {
    // SAFETY: guard points into an initialised guard table.
    let index = unsafe { *guard };
    if index == 0 {
        return;
    }
    record(index as usize % MAP_SIZE);
}

fn record(slot: usize) {
    if EDGE_MAP[slot].swap(1, Ordering::Relaxed) == 0 {
        EDGE_COUNT.fetch_add(1, Ordering::Relaxed);
    }
}

/// Number of distinct edges observed since process start. Monotone.
pub fn get_coverage() -> usize {
    EDGE_COUNT.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test on purpose: the edge map is process-global and cumulative,
    // so all assertions work on deltas within one sequential scenario.
    #[test]
    fn guard_hits_accumulate_distinct_edges_monotonically() {
        let mut guards = [0u32; 8];
        let range = guards.as_mut_ptr_range();
        unsafe { __sanitizer_cov_trace_pc_guard_init(range.start, range.end) };
        assert!(guards.iter().all(|&g| g != 0), "init must assign indices");
        let first = guards[0];

        // Re-running init on the same table must not reassign.
        unsafe { __sanitizer_cov_trace_pc_guard_init(range.start, range.end) };
        assert_eq!(guards[0], first);

        let before = get_coverage();
        for guard in &mut guards {
            unsafe { __sanitizer_cov_trace_pc_guard(guard) };
        }
        assert_eq!(get_coverage(), before + guards.len());

        // Hitting the same edges again adds nothing.
        for guard in &mut guards {
            unsafe { __sanitizer_cov_trace_pc_guard(guard) };
        }
        assert_eq!(get_coverage(), before + guards.len());

        // An uninstrumented (zero) guard is ignored.
        let mut zero = 0u32;
        unsafe { __sanitizer_cov_trace_pc_guard(&mut zero) };
        assert_eq!(get_coverage(), before + guards.len());
    }
}
