//! Single-threaded readiness multiplexer.
//!
//! Three sources: the capture descriptor and the two shutdown-signal pipes.
//! The wait timeout is coarse; all wakeups are readiness-driven and the
//! timeout only bounds the sleep. Shutdown is observed at most one wakeup
//! after delivery, and in-flight packet handling completes first.

use std::io;

use crate::error::Error;
use crate::signals::SignalPipe;

const WAIT_MS: libc::c_int = 24 * 60 * 60 * 1000;

pub struct EventLoop<'a> {
    capture_fd: libc::c_int,
    shutdown: [&'a SignalPipe; 2],
}

impl<'a> EventLoop<'a> {
    pub fn new(capture_fd: libc::c_int, shutdown: [&'a SignalPipe; 2]) -> Self {
        Self {
            capture_fd,
            shutdown,
        }
    }

    /// Run until a shutdown signal is observed.
    ///
    /// `on_capture` must drain the capture handle; it is invoked once per
    /// readable wakeup and only its fatal errors propagate.
    pub fn run<F>(&mut self, mut on_capture: F) -> Result<(), Error>
    where
        F: FnMut() -> Result<(), Error>,
    {
        let mut done = false;
        while !done {
            let mut fds = [
                libc::pollfd {
                    fd: self.capture_fd,
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.shutdown[0].descriptor(),
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.shutdown[1].descriptor(),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];

            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, WAIT_MS) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err.into());
            }
            if rc == 0 {
                // Coarse timeout; re-enter the wait.
                continue;
            }

            for (index, pipe) in self.shutdown.iter().enumerate() {
                if fds[1 + index].revents != 0 && pipe.drain() {
                    done = true;
                }
            }
            if fds[0].revents != 0 {
                on_capture()?;
            }
        }
        Ok(())
    }
}
