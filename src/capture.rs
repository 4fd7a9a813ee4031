//! Capture handle construction.
//!
//! The heavy lifting happens in the kernel: the BPF filter below admits only
//! the two ICMP messages this daemon relays, and never frames that are
//! already broadcast. The handle is switched to non-blocking mode so the
//! event loop can drain it on readiness.

use pcap::{Active, Capture};

use crate::error::Error;

/// ICMPv4 fragmentation-needed, ICMPv6 packet-too-big, and nothing that is
/// already addressed to the broadcast MAC.
pub const BPF_FILTER: &str = "((icmp and icmp[0] == 3 and icmp[1] == 4) or \
     (icmp6 and ip6[40+0] == 2 and ip6[40+1] == 0)) \
     and (ether dst not ff:ff:ff:ff:ff:ff)";

/// Bytes captured per frame: the headers the classifier walks plus the
/// quoted datagram.
pub const SNAPLEN: i32 = 2048;

const POLL_TIMEOUT_MS: i32 = 1000;

/// Open `iface` for live capture with the filter attached.
pub fn open(iface: &str) -> Result<Capture<Active>, Error> {
    let mut capture = Capture::from_device(iface)?
        .promisc(false)
        .snaplen(SNAPLEN)
        .timeout(POLL_TIMEOUT_MS)
        .open()?;
    capture.filter(BPF_FILTER, true)?;
    let capture = capture.setnonblock()?;
    Ok(capture)
}
