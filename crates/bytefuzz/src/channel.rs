//! The byte-oriented duplex channel between supervisor and worker.
//!
//! Two pipes form the duplex pair. The supervisor sends length-prefixed raw
//! input frames; the worker replies with a one-byte tag followed by either a
//! coverage count (`I`) or a rendered fault (`E`). Exactly one input is in
//! flight at any time, so replies pair 1:1 with the most recent request.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Duration;

use nix::sys::select::FdSet;
use nix::sys::signal::{SigSet, Signal};
use nix::sys::time::TimeSpec;
use os_pipe::{PipeReader, PipeWriter};

/// Reply sent by the worker after each execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Cumulative coverage cardinality after a successful run.
    Coverage(u64),
    /// The target raised; the payload is the rendered error.
    Fault(String),
}

mod tag {
    pub const COVERAGE: u8 = b'I';
    pub const FAULT: u8 = b'E';
}

/// One endpoint of the channel.
#[derive(Debug)]
pub struct Channel {
    rx: PipeReader,
    tx: PipeWriter,
}

/// Create the connected endpoints: `(supervisor, worker)`.
///
/// Each process must drop the endpoint it does not own right after forking
/// so that the peer's death surfaces as end-of-file.
pub fn pair() -> io::Result<(Channel, Channel)> {
    let (supervisor_rx, worker_tx) = os_pipe::pipe()?;
    let (worker_rx, supervisor_tx) = os_pipe::pipe()?;
    Ok((
        Channel {
            rx: supervisor_rx,
            tx: supervisor_tx,
        },
        Channel {
            rx: worker_rx,
            tx: worker_tx,
        },
    ))
}

impl Channel {
    /// Send one input frame, byte-exact.
    pub fn send_input(&mut self, buf: &[u8]) -> io::Result<()> {
        let len = u32::try_from(buf.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "input exceeds frame size"))?;
        self.tx.write_all(&len.to_ne_bytes())?;
        self.tx.write_all(buf)
    }

    /// Block until the next input frame arrives.
    pub fn recv_input(&mut self) -> io::Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        let mut buf = vec![0u8; len];
        self.rx.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn send_coverage(&mut self, coverage: u64) -> io::Result<()> {
        self.tx.write_all(&[tag::COVERAGE])?;
        self.tx.write_all(&coverage.to_ne_bytes())
    }

    pub fn send_fault(&mut self, message: &str) -> io::Result<()> {
        let bytes = message.as_bytes();
        let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        let bytes = &bytes[..len as usize];
        self.tx.write_all(&[tag::FAULT])?;
        self.tx.write_all(&len.to_ne_bytes())?;
        self.tx.write_all(bytes)
    }

    /// Wait for the worker's reply; `None` when the timeout expires first.
    ///
    /// An error here means the channel itself broke (worker died without
    /// replying), which the supervisor treats as a crash.
    pub fn recv_reply_timeout(&mut self, timeout: Duration) -> io::Result<Option<Reply>> {
        if !self.wait_readable(timeout)? {
            return Ok(None);
        }
        let mut tag_buf = [0u8; 1];
        self.rx.read_exact(&mut tag_buf)?;
        match tag_buf[0] {
            tag::COVERAGE => {
                let mut buf = [0u8; 8];
                self.rx.read_exact(&mut buf)?;
                Ok(Some(Reply::Coverage(u64::from_ne_bytes(buf))))
            }
            tag::FAULT => {
                let len = self.read_u32()? as usize;
                let mut buf = vec![0u8; len];
                self.rx.read_exact(&mut buf)?;
                Ok(Some(Reply::Fault(
                    String::from_utf8_lossy(&buf).into_owned(),
                )))
            }
            other => Err(io::Error::other(format!("invalid reply tag {other:#04x}"))),
        }
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.rx.read_exact(&mut buf)?;
        Ok(u32::from_ne_bytes(buf))
    }

    /// pselect on the read end, with SIGINT kept deliverable so an interrupt
    /// can cut a long wait short.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        // SAFETY: the reader is alive for the duration of the borrow.
        let fd = unsafe { BorrowedFd::borrow_raw(self.rx.as_raw_fd()) };
        let mut readfds = FdSet::new();
        readfds.insert(fd);
        let timeout = TimeSpec::from_duration(timeout);
        let mut sigmask = SigSet::empty();
        sigmask.add(Signal::SIGINT);
        let ready = nix::sys::select::pselect(
            None,
            &mut readfds,
            None,
            None,
            Some(&timeout),
            Some(&sigmask),
        )
        .map_err(io::Error::from)?;
        Ok(ready > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_frames_round_trip_byte_exact() {
        let (mut supervisor, mut worker) = pair().unwrap();
        supervisor.send_input(b"\x00\x01payload\xff").unwrap();
        assert_eq!(worker.recv_input().unwrap(), b"\x00\x01payload\xff");

        supervisor.send_input(b"").unwrap();
        assert_eq!(worker.recv_input().unwrap(), b"");
    }

    #[test]
    fn coverage_reply_round_trips() {
        let (mut supervisor, mut worker) = pair().unwrap();
        worker.send_coverage(12345).unwrap();
        let reply = supervisor
            .recv_reply_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(reply, Some(Reply::Coverage(12345)));
    }

    #[test]
    fn fault_reply_round_trips() {
        let (mut supervisor, mut worker) = pair().unwrap();
        worker.send_fault("index out of bounds").unwrap();
        let reply = supervisor
            .recv_reply_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(reply, Some(Reply::Fault("index out of bounds".into())));
    }

    #[test]
    fn reply_wait_times_out_on_a_silent_worker() {
        let (mut supervisor, _worker) = pair().unwrap();
        let reply = supervisor
            .recv_reply_timeout(Duration::from_millis(50))
            .unwrap();
        assert_eq!(reply, None);
    }

    #[test]
    fn a_dead_peer_surfaces_as_an_error() {
        let (mut supervisor, worker) = pair().unwrap();
        drop(worker);
        let err = supervisor
            .recv_reply_timeout(Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
