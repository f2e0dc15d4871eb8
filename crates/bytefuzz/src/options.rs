//! The command line surface a consumer binary exposes through
//! [`fuzz_main`](crate::fuzz_main).

use std::path::PathBuf;

/// Options controlling a fuzzing session.
#[derive(Debug, Clone, clap::Parser)]
#[command(about = "Coverage-guided in-process fuzzer", version)]
pub struct FuzzerOptions {
    /// Seed corpus directories or files; the first one is also where newly
    /// found inputs are saved.
    pub dirs: Vec<PathBuf>,

    /// Write crash/timeout samples to this exact path instead of
    /// `<prefix><sha256>` in the working directory.
    #[arg(long)]
    pub exact_artifact_path: Option<PathBuf>,

    /// Run the fixed set of inputs only, for regression or reproduction
    /// (reserved).
    #[arg(long, default_value_t = false)]
    pub regression: bool,

    /// Memory ceiling for supervisor + worker, in MB.
    #[arg(long, default_value_t = 2048)]
    pub rss_limit_mb: u64,

    /// Hard upper bound on generated input length, in bytes.
    #[arg(long, default_value_t = 4096)]
    pub max_input_size: usize,

    /// Bitmask silencing worker output: bit 0 stdout, bit 1 stderr.
    #[arg(long, default_value_t = 0)]
    pub close_fd_mask: u32,

    /// Stop after this many successful executions; -1 keeps running.
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    pub runs: i64,

    /// Per-execution time budget, in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Whitespace separated tag expression selecting mutation operators;
    /// prefix a tag with `!` to reject it (e.g. "byte !dictionary").
    #[arg(long)]
    pub mutators: Option<String>,

    /// AFL/libFuzzer dictionary file, or a directory of token files.
    #[arg(long)]
    pub dict: Option<PathBuf>,

    /// Seed for the input-generation PRNG; defaults to the wall clock.
    #[arg(long)]
    pub seed: Option<u64>,

    /// List the mutation operators (with the current filter applied) and
    /// exit.
    #[arg(long, default_value_t = false)]
    pub list_mutators: bool,
}

impl Default for FuzzerOptions {
    fn default() -> Self {
        Self {
            dirs: Vec::new(),
            exact_artifact_path: None,
            regression: false,
            rss_limit_mb: 2048,
            max_input_size: 4096,
            close_fd_mask: 0,
            runs: -1,
            timeout: 30,
            mutators: None,
            dict: None,
            seed: None,
            list_mutators: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let options = FuzzerOptions::parse_from(["fuzz"]);
        assert_eq!(options.rss_limit_mb, 2048);
        assert_eq!(options.max_input_size, 4096);
        assert_eq!(options.close_fd_mask, 0);
        assert_eq!(options.runs, -1);
        assert_eq!(options.timeout, 30);
        assert!(options.dirs.is_empty());
        assert!(!options.regression);
    }

    #[test]
    fn positional_dirs_and_flags_parse() {
        let options = FuzzerOptions::parse_from([
            "fuzz",
            "corpus",
            "extra-seeds",
            "--runs",
            "100",
            "--mutators",
            "byte !dictionary",
            "--seed",
            "42",
        ]);
        assert_eq!(options.dirs.len(), 2);
        assert_eq!(options.runs, 100);
        assert_eq!(options.mutators.as_deref(), Some("byte !dictionary"));
        assert_eq!(options.seed, Some(42));
    }

    #[test]
    fn negative_run_cap_parses() {
        let options = FuzzerOptions::parse_from(["fuzz", "--runs", "-1"]);
        assert_eq!(options.runs, -1);
    }
}
