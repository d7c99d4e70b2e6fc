//! Link-layer stub prepended to every captured IP packet. Packets are seen above the link layer and analyzers
//! expect Ethernet framing.

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const ETHERTYPE_IPV4: u16 = 0x0800;

pub const STUB_DST_MAC: [u8; 6] = [0x00; 6];
pub const STUB_SRC_MAC: [u8; 6] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x01];

/// dst MAC (zero) / src MAC (placeholder) / ethertype IPv4
pub fn stub_header() -> [u8; ETHERNET_HEADER_LEN] {
    let mut header = [0u8; ETHERNET_HEADER_LEN];
    header[0..6].copy_from_slice(&STUB_DST_MAC);
    header[6..12].copy_from_slice(&STUB_SRC_MAC);
    header[12..14].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
    header
}

/// The ethertype of an Ethernet frame, if it is long enough to have one.
pub fn ethertype(frame: &[u8]) -> Option<u16> {
    frame.get(12..14).map(|b| u16::from_be_bytes([b[0], b[1]]))
}
