//! bytefuzz — a coverage-guided, in-process fuzzing engine.
//!
//! A consumer wraps a target function with [`fuzz_main`] and gets a complete
//! fuzzer binary: the supervisor process owns the corpus and the mutation
//! engine, a forked worker runs the target under SanitizerCoverage
//! instrumentation, and any input that raises, stalls past the time budget
//! or trips the memory ceiling is persisted under its content hash.
//!
//! ```no_run
//! fn main() {
//!     bytefuzz::fuzz_main(|data| {
//!         let _ = std::str::from_utf8(data);
//!     });
//! }
//! ```

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod artifacts;
pub mod channel;
pub mod corpus;
pub mod dictionary;
pub mod mutation;
pub mod options;
pub mod rng;
pub mod rss;
pub mod supervisor;
pub mod tracer;
pub mod worker;

mod entry;

pub use entry::fuzz_main;
pub use options::FuzzerOptions;
pub use supervisor::{Fuzzer, SessionEnd};
