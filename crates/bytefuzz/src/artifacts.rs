//! Persisting inputs that crashed, timed out, or tripped the memory ceiling.

use std::fs;
use std::path::PathBuf;

use derive_new::new as New;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

pub const CRASH_PREFIX: &str = "crash-";
pub const TIMEOUT_PREFIX: &str = "timeout-";

/// Writes offending inputs to disk, named by content hash unless an exact
/// path override is configured.
#[derive(Debug, Clone, Default, New)]
pub struct ArtifactWriter {
    exact_path: Option<PathBuf>,
}

impl ArtifactWriter {
    /// Persist `buf` under `<prefix><sha256-hex>` (or the exact override).
    ///
    /// The location is logged first, with a hex dump for short samples so a
    /// log line alone is enough to reproduce small findings. Write failures
    /// are logged rather than propagated; the session outcome stands either
    /// way. Returns the chosen path.
    pub fn write(&self, buf: &[u8], prefix: &str) -> PathBuf {
        let path = match &self.exact_path {
            Some(path) => path.clone(),
            None => PathBuf::from(format!("{prefix}{}", hex::encode(Sha256::digest(buf)))),
        };
        info!("sample written to {}", path.display());
        if buf.len() < 200 {
            info!("sample = {}", hex::encode(buf));
        }
        if let Err(err) = fs::write(&path, buf) {
            warn!("failed to write artifact {}: {err}", path.display());
        }
        path
    }
}
