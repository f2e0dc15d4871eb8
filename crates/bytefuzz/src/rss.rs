//! Resident-set sampling for the out-of-memory guard.

use std::{fs, io};

use nix::unistd::{Pid, SysconfVar, sysconf};

/// Combined resident set size of the given processes, in megabytes.
///
/// Reads `/proc/<pid>/statm`; a process that cannot be sampled contributes
/// zero. Resource accounting must never bring the session down.
pub fn combined_rss_mb(pids: &[Pid]) -> u64 {
    let bytes: u64 = pids.iter().map(|pid| rss_bytes(*pid).unwrap_or(0)).sum();
    bytes / (1024 * 1024)
}

fn rss_bytes(pid: Pid) -> io::Result<u64> {
    let statm = fs::read_to_string(format!("/proc/{pid}/statm"))?;
    let resident_pages: u64 = statm
        .split_whitespace()
        .nth(1)
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed statm"))?;
    Ok(resident_pages * page_size())
}

fn page_size() -> u64 {
    sysconf(SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
        .map_or(4096, |size| size as u64)
}
