//! The worker half of the engine: receive an input, run the target under
//! the tracer, report coverage or the fault that ended the session.
//!
//! Coverage instrumentation is compiled into the whole binary (see
//! [`crate::tracer`]), so there is nothing to install at runtime beyond
//! optionally silencing the target's output streams.

use std::any::Any;
use std::fs::OpenOptions;
use std::io;
use std::panic::{self, AssertUnwindSafe};

use bitflags::bitflags;
use nix::unistd::{dup2_stderr, dup2_stdout};

use crate::channel::Channel;
use crate::tracer;

bitflags! {
    /// Which standard streams the worker redirects to the null device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FdMask: u32 {
        const STDOUT = 1;
        const STDERR = 2;
    }
}

/// Run the worker loop until the target faults or the channel closes.
///
/// Every received input is executed exactly once; a successful return sends
/// the cumulative coverage count, a panic sends the fault reply and ends the
/// loop. The caller exits the process afterwards; control never returns to
/// the fuzzing loop.
pub fn run(
    channel: &mut Channel,
    target: &(dyn Fn(&[u8]) + 'static),
    fd_mask: FdMask,
) -> io::Result<()> {
    silence_streams(fd_mask)?;
    loop {
        let input = channel.recv_input()?;
        match panic::catch_unwind(AssertUnwindSafe(|| target(&input))) {
            Ok(()) => channel.send_coverage(tracer::get_coverage() as u64)?,
            Err(payload) => {
                channel.send_fault(&panic_message(payload.as_ref()))?;
                return Ok(());
            }
        }
    }
}

fn silence_streams(mask: FdMask) -> io::Result<()> {
    if mask.is_empty() {
        return Ok(());
    }
    let null = OpenOptions::new().write(true).open("/dev/null")?;
    if mask.contains(FdMask::STDOUT) {
        dup2_stdout(&null).map_err(io::Error::from)?;
    }
    if mask.contains(FdMask::STDERR) {
        dup2_stderr(&null).map_err(io::Error::from)?;
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "target panicked".to_owned()
    }
}
