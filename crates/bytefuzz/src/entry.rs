//! The consumer entry point: wrap a target function into a complete fuzzer
//! binary.

use std::process;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::mutation;
use crate::options::FuzzerOptions;
use crate::supervisor::Fuzzer;

/// Exit code for configuration errors (bad filter, unreadable seeds, ...).
const CONFIG_ERROR_CODE: i32 = 64;

/// Parse the command line, run a fuzzing session over `target`, and exit
/// with a CI-friendly code: zero when the run cap completes, non-zero for
/// crash, timeout or out-of-memory.
///
/// ```no_run
/// fn main() {
///     bytefuzz::fuzz_main(|data| {
///         let _ = std::str::from_utf8(data);
///     });
/// }
/// ```
pub fn fuzz_main<F>(target: F) -> !
where
    F: Fn(&[u8]) + 'static,
{
    let options = FuzzerOptions::parse();
    init_logging();

    if options.list_mutators {
        match mutation::catalog_listing(options.mutators.as_deref()) {
            Ok(listing) => {
                println!("{listing}");
                process::exit(0);
            }
            Err(err) => {
                tracing::error!("{err}");
                process::exit(CONFIG_ERROR_CODE);
            }
        }
    }

    match Fuzzer::new(Box::new(target), options).run() {
        Ok(end) => process::exit(end.exit_code()),
        Err(err) => {
            tracing::error!("fuzzing session failed: {err}");
            process::exit(CONFIG_ERROR_CODE);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    // try_init: embedding programs may have installed their own subscriber.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init();
}
