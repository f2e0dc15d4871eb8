//! The supervising half of the engine: owns the corpus, the PRNG and the
//! scheduling loop; forks the worker, enforces the run cap, the per-input
//! timeout and the memory ceiling, and logs run statistics.

use std::io;
use std::process;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, Pid, fork};
use tracing::{info, warn};

use crate::artifacts::{ArtifactWriter, CRASH_PREFIX, TIMEOUT_PREFIX};
use crate::channel::{self, Reply};
use crate::corpus::{Corpus, CorpusError};
use crate::dictionary::Dictionary;
use crate::options::FuzzerOptions;
use crate::rng::EngineRand;
use crate::rss;
use crate::worker::{self, FdMask};

/// Minimum interval between periodic PULSE stats lines.
const SAMPLING_WINDOW: Duration = Duration::from_secs(5);

/// Set by the SIGINT handler; checked once per scheduling iteration.
static STOP: AtomicBool = AtomicBool::new(false);
static INSTALL_STOP_HANDLER: Once = Once::new();

#[derive(Debug, thiserror::Error)]
pub enum FuzzError {
    #[error("corpus setup failed: {0}")]
    Corpus(#[from] CorpusError),
    #[error("dictionary load failed: {0}")]
    Dictionary(#[source] io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// How a fuzzing session ended, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The configured run cap was reached.
    RunLimit,
    /// SIGINT asked the session to stop.
    Interrupted,
    /// The target raised, or the worker died without replying.
    Crash,
    /// An execution exceeded the time budget.
    Timeout,
    /// Supervisor + worker exceeded the RSS ceiling.
    OutOfMemory,
}

impl SessionEnd {
    pub fn exit_code(self) -> i32 {
        match self {
            SessionEnd::RunLimit => 0,
            SessionEnd::Crash => 1,
            SessionEnd::Timeout => 2,
            SessionEnd::OutOfMemory => 3,
            SessionEnd::Interrupted => 130,
        }
    }
}

#[derive(Debug, Clone, Copy, derive_more::Display)]
enum LogKind {
    #[display("NEW")]
    New,
    #[display("PULSE")]
    Pulse,
}

/// Supervisor-owned run statistics; monotone except for the sampling window.
#[derive(Debug)]
struct RunStats {
    total_executions: u64,
    executions_in_sample: u64,
    last_sample_time: Instant,
    total_coverage: u64,
}

impl RunStats {
    fn new() -> Self {
        Self {
            total_executions: 0,
            executions_in_sample: 0,
            last_sample_time: Instant::now(),
            total_coverage: 0,
        }
    }

    fn log(&mut self, kind: LogKind, corpus_len: usize, rss_mb: u64) {
        let elapsed = self.last_sample_time.elapsed().as_secs_f64();
        let execs_per_second = if elapsed > 0.0 {
            (self.executions_in_sample as f64 / elapsed) as u64
        } else {
            0
        };
        self.last_sample_time = Instant::now();
        self.executions_in_sample = 0;
        info!(
            "#{} {}     cov: {} corp: {} exec/s: {} rss: {} MB",
            self.total_executions, kind, self.total_coverage, corpus_len, execs_per_second, rss_mb
        );
    }
}

/// A complete fuzzing session over one target function.
pub struct Fuzzer {
    target: Box<dyn Fn(&[u8])>,
    options: FuzzerOptions,
}

impl std::fmt::Debug for Fuzzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fuzzer")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Fuzzer {
    pub fn new(target: Box<dyn Fn(&[u8])>, options: FuzzerOptions) -> Self {
        Self { target, options }
    }

    /// Run the session to completion.
    ///
    /// Spawns the worker once, then alternates between producing an input
    /// and awaiting its reply. Every exit path kills and reaps the worker.
    pub fn run(self) -> Result<SessionEnd, FuzzError> {
        let options = &self.options;
        let dict = match &options.dict {
            Some(path) => Dictionary::load(path).map_err(FuzzError::Dictionary)?,
            None => Dictionary::default(),
        };
        let mut corpus = Corpus::new(
            &options.dirs,
            options.max_input_size,
            options.mutators.as_deref(),
            dict,
        )?;
        let mut rand = match options.seed {
            Some(seed) => EngineRand::with_seed(seed),
            None => EngineRand::from_clock(),
        };
        let fd_mask = FdMask::from_bits_truncate(options.close_fd_mask);
        let artifacts = ArtifactWriter::new(options.exact_artifact_path.clone());

        info!("#0 READ units: {}", corpus.len());

        let (mut chan, mut worker_chan) = channel::pair()?;
        // SAFETY: the supervisor is single threaded up to this point; the
        // child only touches its channel endpoint and the target.
        let worker_pid = match unsafe { fork() }.map_err(io::Error::from)? {
            ForkResult::Child => {
                drop(chan);
                let code = match worker::run(&mut worker_chan, self.target.as_ref(), fd_mask) {
                    Ok(()) => 0,
                    Err(_) => 1,
                };
                process::exit(code);
            }
            ForkResult::Parent { child } => child,
        };
        drop(worker_chan);

        STOP.store(false, Ordering::Relaxed);
        INSTALL_STOP_HANDLER.call_once(|| {
            if let Err(err) = ctrlc::set_handler(|| STOP.store(true, Ordering::Relaxed)) {
                warn!("could not install the interrupt handler: {err}");
            }
        });

        let mut stats = RunStats::new();
        let timeout = Duration::from_secs(options.timeout);
        let outcome = loop {
            if STOP.load(Ordering::Relaxed) {
                info!("interrupted, stopping.");
                break SessionEnd::Interrupted;
            }
            if options.runs >= 0 && stats.total_executions >= options.runs as u64 {
                info!("did {} runs, stopping now.", options.runs);
                break SessionEnd::RunLimit;
            }

            let input = corpus.generate_input(&mut rand);
            if let Err(err) = chan.send_input(&input) {
                info!("worker channel closed unexpectedly: {err}");
                artifacts.write(&input, CRASH_PREFIX);
                break SessionEnd::Crash;
            }
            match chan.recv_reply_timeout(timeout) {
                Ok(None) => {
                    info!("=================================================================");
                    info!("timeout reached. testcase took: {}", options.timeout);
                    artifacts.write(&input, TIMEOUT_PREFIX);
                    break SessionEnd::Timeout;
                }
                Ok(Some(Reply::Fault(message))) => {
                    info!("target fault: {message}");
                    artifacts.write(&input, CRASH_PREFIX);
                    break SessionEnd::Crash;
                }
                Ok(Some(Reply::Coverage(coverage))) => {
                    stats.total_executions += 1;
                    stats.executions_in_sample += 1;
                    let rss_mb = rss::combined_rss_mb(&[Pid::this(), worker_pid]);
                    if coverage > stats.total_coverage {
                        stats.total_coverage = coverage;
                        corpus.put(input.clone());
                        stats.log(LogKind::New, corpus.len(), rss_mb);
                    } else if stats.last_sample_time.elapsed() > SAMPLING_WINDOW {
                        stats.log(LogKind::Pulse, corpus.len(), rss_mb);
                    }
                    if rss_mb > options.rss_limit_mb {
                        info!(
                            "MEMORY OOM: exceeded {} MB. Killing worker",
                            options.rss_limit_mb
                        );
                        artifacts.write(&input, CRASH_PREFIX);
                        break SessionEnd::OutOfMemory;
                    }
                }
                Err(err) => {
                    info!("worker channel closed unexpectedly: {err}");
                    artifacts.write(&input, CRASH_PREFIX);
                    break SessionEnd::Crash;
                }
            }
        };

        reap(worker_pid);
        Ok(outcome)
    }
}

/// Kill the worker and collect it; losing the worker is the expected way
/// every session ends.
fn reap(worker_pid: Pid) {
    match signal::kill(worker_pid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!("failed to kill worker {worker_pid}: {err}"),
    }
    match waitpid(worker_pid, None) {
        Ok(_) | Err(Errno::ECHILD) => {}
        Err(err) => warn!("failed to reap worker {worker_pid}: {err}"),
    }
}
