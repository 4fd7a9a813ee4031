//! Raw-frame injection on a bound interface.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

/// Sink for rewritten frames.
///
/// The pipeline is generic over this seam so tests can record frames instead
/// of opening a raw socket.
pub trait Inject {
    fn inject(&mut self, frame: &[u8]) -> io::Result<()>;
}

/// `AF_PACKET` sender bound to a single interface.
pub struct RawInjector {
    fd: OwnedFd,
}

impl RawInjector {
    /// Open a non-blocking raw packet socket bound to `iface` by index.
    pub fn open(iface: &str) -> io::Result<Self> {
        let name = CString::new(iface)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name has NUL"))?;
        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            return Err(io::Error::last_os_error());
        }

        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                0,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_ifindex = ifindex as libc::c_int;
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { fd })
    }
}

impl Inject for RawInjector {
    fn inject(&mut self, frame: &[u8]) -> io::Result<()> {
        let rc = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                frame.as_ptr().cast(),
                frame.len(),
                0,
            )
        };
        if rc >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            // Send-buffer exhaustion during IRQ storms; drop the frame.
            Some(libc::ENOBUFS) | Some(libc::EAGAIN) => Ok(()),
            _ => Err(err),
        }
    }
}
