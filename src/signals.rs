//! Translates asynchronous signal delivery into a serialized, loss-free event
//! stream the supervisor polls from its single-threaded main loop.
//!
//! SIGTERM, SIGINT, SIGHUP and SIGQUIT are all treated as shutdown requests.
//! SIGCHLD just wakes the loop; the Reaper is responsible for draining every
//! exited child once it does, since POSIX does not queue duplicate standard
//! signals and a burst of deaths can coalesce into a single delivery.

use std::os::fd::AsRawFd;

use nix::sys::signal::{SigSet, SigmaskHow, Signal, sigprocmask};
use nix::sys::signalfd::{SfdFlags, SignalFd};

use crate::error::{Error, Result};

/// One item in the serialized event stream the Supervisor consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A termination request arrived from outside the container.
    Term(Signal),
    /// At least one child may have exited; drain all of them, not just one.
    Chld,
}

const SHUTDOWN_SIGNALS: [Signal; 4] = [
    Signal::SIGTERM,
    Signal::SIGINT,
    Signal::SIGHUP,
    Signal::SIGQUIT,
];

/// Owns the signalfd backing the event stream.
///
/// Must be constructed before any child is forked: the signal mask it installs
/// has to be in place before PID 1's default dispositions could otherwise let
/// a stray SIGTERM slip through unseen.
pub struct SignalIntake {
    fd: SignalFd,
}

impl SignalIntake {
    pub fn install() -> Result<Self> {
        let mut mask = SigSet::empty();
        for sig in SHUTDOWN_SIGNALS {
            mask.add(sig);
        }
        mask.add(Signal::SIGCHLD);

        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&mask), None)?;
        let fd = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)?;
        Ok(Self { fd })
    }

    /// Blocks for at most `timeout_ms` milliseconds (or forever if `None`) for
    /// the next event. Returns `Ok(None)` on a plain timeout, never losing a
    /// signal that arrived: anything pending stays queued in the kernel mask
    /// until the next successful read.
    pub fn next(&mut self, timeout_ms: Option<u32>) -> Result<Option<Event>> {
        if let Some(event) = self.try_read()? {
            return Ok(Some(event));
        }

        let mut pollfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout = timeout_ms.map(|ms| ms as i32).unwrap_or(-1);
        let ready = unsafe { libc::poll(&mut pollfd, 1, timeout) };
        if ready < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        if ready == 0 {
            return Ok(None);
        }

        self.try_read()
    }

    fn try_read(&mut self) -> Result<Option<Event>> {
        match self.fd.read_signal()? {
            Some(info) => Ok(Some(classify(info.ssi_signo))),
            None => Ok(None),
        }
    }
}

fn classify(signo: u32) -> Event {
    let signal = Signal::try_from(signo as i32).expect("signalfd delivered an unmasked signal");
    if signal == Signal::SIGCHLD {
        Event::Chld
    } else {
        Event::Term(signal)
    }
}
