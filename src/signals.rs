//! Shutdown signal plumbing.
//!
//! Each registered signal gets a non-blocking pipe: the handler writes one
//! byte to the write end, the event loop polls the read end. Delivery
//! therefore serializes with packet readiness instead of interrupting it,
//! and no packet work ever happens inside a handler.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};

const MAX_SIGNAL: usize = 32;

/// Write ends indexed by signal number; -1 means unregistered.
static WRITE_ENDS: [AtomicI32; MAX_SIGNAL] = [const { AtomicI32::new(-1) }; MAX_SIGNAL];

extern "C" fn forward(signum: libc::c_int) {
    let fd = WRITE_ENDS[signum as usize].load(Ordering::Relaxed);
    if fd >= 0 {
        let byte = signum as u8;
        // write(2) is async-signal-safe. A full pipe already carries a
        // pending wakeup, so the result is ignored either way.
        unsafe { libc::write(fd, (&byte as *const u8).cast(), 1) };
    }
}

/// One registered signal and its readable descriptor.
pub struct SignalPipe {
    read_end: OwnedFd,
    _write_end: OwnedFd,
    signum: libc::c_int,
}

impl SignalPipe {
    /// Install a handler for `signum` whose deliveries become readable on
    /// [`descriptor`](Self::descriptor).
    pub fn register(signum: libc::c_int) -> io::Result<Self> {
        assert!((0..MAX_SIGNAL as libc::c_int).contains(&signum));

        let mut fds = [0 as libc::c_int; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        let read_end = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let write_end = unsafe { OwnedFd::from_raw_fd(fds[1]) };

        // Publish the write end before the handler can fire.
        WRITE_ENDS[signum as usize].store(write_end.as_raw_fd(), Ordering::SeqCst);

        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = forward as *const () as usize;
            libc::sigemptyset(&raw mut action.sa_mask);
            if libc::sigaction(signum, &action, std::ptr::null_mut()) < 0 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(Self {
            read_end,
            _write_end: write_end,
            signum,
        })
    }

    pub fn descriptor(&self) -> RawFd {
        self.read_end.as_raw_fd()
    }

    /// Read the pipe dry. Returns true if at least one delivery was pending.
    pub fn drain(&self) -> bool {
        let mut buf = [0u8; 64];
        let mut seen = false;
        loop {
            let rc = unsafe {
                libc::read(
                    self.read_end.as_raw_fd(),
                    buf.as_mut_ptr().cast(),
                    buf.len(),
                )
            };
            if rc > 0 {
                seen = true;
            } else {
                return seen;
            }
        }
    }
}

impl Drop for SignalPipe {
    fn drop(&mut self) {
        WRITE_ENDS[self.signum as usize].store(-1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raised_signal_becomes_readable() {
        let pipe = SignalPipe::register(libc::SIGUSR1).unwrap();
        assert!(!pipe.drain());
        unsafe { libc::raise(libc::SIGUSR1) };
        assert!(pipe.drain());
        // Reading it dry means the next drain sees nothing.
        assert!(!pipe.drain());
    }
}
