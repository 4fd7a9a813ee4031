//! Literal frame builders shared by the parser and pipeline tests.

pub const SRC_MAC: [u8; 6] = [0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa];
pub const DST_MAC: [u8; 6] = [0xbb, 0xbb, 0xbb, 0xbb, 0xbb, 0xbb];

fn ipv4_header(src: [u8; 4], dst: [u8; 4], protocol: u8) -> [u8; 20] {
    let mut header = [0u8; 20];
    header[0] = 0x45; // version 4, IHL 5
    header[8] = 64; // TTL
    header[9] = protocol;
    header[12..16].copy_from_slice(&src);
    header[16..20].copy_from_slice(&dst);
    header
}

fn tcp_first_8(sport: u16, dport: u16) -> [u8; 8] {
    let mut l4 = [0u8; 8];
    l4[0..2].copy_from_slice(&sport.to_be_bytes());
    l4[2..4].copy_from_slice(&dport.to_be_bytes());
    l4
}

/// Ethernet + IPv4 + ICMP type 3 code 4 + quoted IPv4 datagram with the
/// first 8 bytes of its TCP header. 70 bytes.
pub fn ipv4_frag_needed(src_ip: [u8; 4], inner_sport: u16) -> Vec<u8> {
    let router = [192, 0, 2, 7];
    let mut frame = Vec::with_capacity(70);
    frame.extend_from_slice(&DST_MAC);
    frame.extend_from_slice(&SRC_MAC);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());
    frame.extend_from_slice(&ipv4_header(src_ip, router, 1));
    frame.extend_from_slice(&[3, 4, 0, 0, 0, 0, 0x05, 0xdc]); // frag needed, MTU 1500
    frame.extend_from_slice(&ipv4_header(router, src_ip, 6));
    frame.extend_from_slice(&tcp_first_8(inner_sport, 80));
    frame
}

/// Ethernet + IPv6 + ICMPv6 type 2 code 0 + a quoted 40-byte IPv6 header.
/// 102 bytes.
pub fn ipv6_packet_too_big(src_ip: [u8; 16]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(102);
    frame.extend_from_slice(&DST_MAC);
    frame.extend_from_slice(&SRC_MAC);
    frame.extend_from_slice(&0x86ddu16.to_be_bytes());
    frame.extend_from_slice(&ipv6_header(src_ip, ipv6_addr("2001:db8::2"), 58));
    frame.extend_from_slice(&[2, 0, 0, 0, 0, 0, 0x05, 0x00]); // packet too big, MTU 1280
    frame.extend_from_slice(&ipv6_header(ipv6_addr("2001:db8::2"), src_ip, 6));
    frame
}

fn ipv6_header(src: [u8; 16], dst: [u8; 16], next_header: u8) -> [u8; 40] {
    let mut header = [0u8; 40];
    header[0] = 0x60;
    header[6] = next_header;
    header[7] = 64; // hop limit
    header[8..24].copy_from_slice(&src);
    header[24..40].copy_from_slice(&dst);
    header
}

/// Insert an 802.1Q tag (VID 42) after the MAC addresses.
pub fn with_vlan(frame: &[u8]) -> Vec<u8> {
    let mut tagged = frame[..12].to_vec();
    tagged.extend_from_slice(&0x8100u16.to_be_bytes());
    tagged.extend_from_slice(&[0x00, 0x2a]);
    tagged.extend_from_slice(&frame[12..]);
    tagged
}

pub fn ipv6_addr(text: &str) -> [u8; 16] {
    text.parse::<std::net::Ipv6Addr>().unwrap().octets()
}
