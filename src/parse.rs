//! Frame classification.
//!
//! Pure offset arithmetic over the captured view: no allocation, no reads
//! past the captured length. The capture filter has already narrowed traffic
//! to ICMP fragmentation-needed / packet-too-big, so the classifier checks
//! structure, not ICMP type or code.
//!
//! The inner-port check is deliberately optimistic: it does not verify that
//! the quoted transport actually carries a source port in its first two
//! bytes, re-validate quoted length fields, or walk IPv6 extension headers.
//! False admits are bounded by the downstream broadcast rate limits.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

use crate::bitmap::BitMap;
use crate::rewrite::BROADCAST_MAC;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86dd;
const ETHERTYPE_VLAN: u16 = 0x8100;

const IPPROTO_ICMP: u8 = 1;
const IPPROTO_ICMPV6: u8 = 58;

/// Ethernet + minimum outer IPv4 + ICMP + enough quoted header to identify.
const MIN_FRAME: usize = 14 + 20 + 8 + 8;

/// Outer source address of an accepted frame; the rate-limiter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKey {
    V4([u8; 4]),
    V6([u8; 16]),
}

impl SourceKey {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            SourceKey::V4(addr) => addr,
            SourceKey::V6(addr) => addr,
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKey::V4(addr) => Ipv4Addr::from(*addr).fmt(f),
            SourceKey::V6(addr) => Ipv6Addr::from(*addr).fmt(f),
        }
    }
}

/// Why a frame was not forwarded.
///
/// The rate-limit variants are produced by the pipeline's admission gates,
/// not by the classifier; they live here so every per-packet outcome shares
/// one vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("frame too short")]
    FrameTooShort,
    #[error("already broadcast")]
    AlreadyBroadcast,
    #[error("unsupported L3")]
    UnsupportedL3,
    #[error("IPv4 header invalid length")]
    BadIpv4HeaderLen,
    #[error("IPv4 protocol not ICMP")]
    NotIcmp,
    #[error("IPv6 next header not ICMPv6")]
    NotIcmpv6,
    #[error("payload too short")]
    PayloadTooShort,
    #[error("invalid inner IP version")]
    BadInnerIpVersion,
    #[error("inner L4 too short")]
    InnerL4TooShort,
    #[error("L4 source port not on allow-list")]
    PortNotAllowed,
    #[error("source rate limit")]
    SourceRateLimit,
    #[error("interface rate limit")]
    InterfaceRateLimit,
}

pub enum Classification {
    Accept {
        source: SourceKey,
    },
    Reject {
        /// Populated when the classifier got far enough to extract it.
        source: Option<SourceKey>,
        reason: RejectReason,
    },
}

/// Classify one captured frame, consulting `ports` when an allow-list is
/// configured.
pub fn classify(frame: &[u8], ports: Option<&BitMap>) -> Classification {
    match run(frame, ports) {
        Ok(source) => Classification::Accept { source },
        Err((source, reason)) => Classification::Reject { source, reason },
    }
}

fn run(
    frame: &[u8],
    ports: Option<&BitMap>,
) -> Result<SourceKey, (Option<SourceKey>, RejectReason)> {
    use RejectReason::*;

    if frame.len() < MIN_FRAME {
        return Err((None, FrameTooShort));
    }
    // Refusing frames already addressed to broadcast breaks the feedback
    // loop with our own output.
    if frame[0..6] == BROADCAST_MAC {
        return Err((None, AlreadyBroadcast));
    }

    let mut ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    let mut l3 = 14;
    if ethertype == ETHERTYPE_VLAN {
        ethertype = u16::from_be_bytes([frame[16], frame[17]]);
        l3 = 18;
    }

    let (source, icmp_offset) = match ethertype {
        ETHERTYPE_IPV4 => {
            if frame[l3] >> 4 != 4 {
                return Err((None, UnsupportedL3));
            }
            let header_len = usize::from(frame[l3] & 0x0f) * 4;
            if header_len < 20 {
                return Err((None, BadIpv4HeaderLen));
            }
            if frame[l3 + 9] != IPPROTO_ICMP {
                return Err((None, NotIcmp));
            }
            // Outer IPv4 + ICMP + quoted IPv4 + first 8 bytes of quoted L4.
            if frame.len() < l3 + 20 + 8 + 20 + 8 {
                return Err((None, FrameTooShort));
            }
            let mut addr = [0u8; 4];
            addr.copy_from_slice(&frame[l3 + 12..l3 + 16]);
            (SourceKey::V4(addr), l3 + header_len)
        }
        ETHERTYPE_IPV6 => {
            if frame[l3] >> 4 != 6 {
                return Err((None, UnsupportedL3));
            }
            // Fixed 40-byte header only; extension-header chains are not
            // walked, matching the capture filter.
            if frame[l3 + 6] != IPPROTO_ICMPV6 {
                return Err((None, NotIcmpv6));
            }
            if frame.len() < l3 + 40 + 8 + 32 {
                return Err((None, FrameTooShort));
            }
            let mut addr = [0u8; 16];
            addr.copy_from_slice(&frame[l3 + 8..l3 + 24]);
            (SourceKey::V6(addr), l3 + 40)
        }
        _ => return Err((None, UnsupportedL3)),
    };

    if let Some(allow) = ports {
        let payload_offset = icmp_offset + 8;
        // Quoted IP version byte plus enough beyond a fixed IPv4 header to
        // reach an L4 header.
        if frame.len() < payload_offset + 9 {
            return Err((Some(source), PayloadTooShort));
        }
        let l4_offset = match frame[payload_offset] >> 4 {
            4 => payload_offset + usize::from(frame[payload_offset] & 0x0f) * 4,
            6 => payload_offset + 40,
            _ => return Err((Some(source), BadInnerIpVersion)),
        };
        if frame.len() < l4_offset + 2 {
            return Err((Some(source), InnerL4TooShort));
        }
        let sport = u16::from_be_bytes([frame[l4_offset], frame[l4_offset + 1]]);
        if !allow.get(usize::from(sport)) {
            return Err((Some(source), PortNotAllowed));
        }
    }

    Ok(source)
}
