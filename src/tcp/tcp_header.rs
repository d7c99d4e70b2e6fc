use crate::packet::checksum;
use crate::packet::errors::HeaderError;
use crate::tcp::tcp_flags::TcpFlags;
use crate::tcp::tcp_options::{self, TcpOptions};
use crate::tcp::wrap32::Wrap32;
use crate::ip::ip_header::PROTOCOL_TCP;
use std::net::Ipv4Addr;

/// Minimum length of a TCP header in bytes.
pub const MIN_HEADER_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_no: Wrap32,
    pub ack_no: Wrap32,
    pub data_offset: u8, // Upper 4 bits of byte 12, in 4-byte words
    pub reserved: u8,    // 3 bits between data offset and NS
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
    pub options: Vec<u8>, // Raw option bytes, kept verbatim
}

impl Default for TcpHeader {
    fn default() -> Self {
        TcpHeader {
            src_port: 0,
            dst_port: 0,
            seq_no: Wrap32::new(0),
            ack_no: Wrap32::new(0),
            data_offset: 5,
            reserved: 0,
            flags: TcpFlags::empty(),
            window: 0,
            checksum: 0,
            urgent: 0,
            options: vec![],
        }
    }
}

impl TcpHeader {
    /// Header length in bytes, options included.
    pub fn header_len_bytes(&self) -> usize {
        self.data_offset as usize * 4
    }

    /// Serialize a `TcpHeader` into `buf`, returning the number of bytes written.
    ///
    /// The checksum field is written as stored.
    pub fn serialize(&self, buf: &mut [u8]) -> Result<usize, HeaderError> {
        let header_len = self.header_len_bytes().max(MIN_HEADER_LEN);
        if buf.len() < header_len {
            return Err(HeaderError::BufferTooSmall { expected: header_len, found: buf.len() });
        }

        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..8].copy_from_slice(&self.seq_no.value().to_be_bytes());
        buf[8..12].copy_from_slice(&self.ack_no.value().to_be_bytes());
        buf[12] = (self.data_offset << 4) | ((self.reserved & 0x07) << 1) | self.flags.ns() as u8;
        buf[13] = self.flags.flags_byte();
        buf[14..16].copy_from_slice(&self.window.to_be_bytes());
        buf[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        buf[18..20].copy_from_slice(&self.urgent.to_be_bytes());

        let options = &mut buf[MIN_HEADER_LEN..header_len];
        options.fill(0);
        let n = self.options.len().min(options.len());
        options[..n].copy_from_slice(&self.options[..n]);

        Ok(header_len)
    }

    /// Serialize into a freshly allocated buffer of the declared header length.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.header_len_bytes().max(MIN_HEADER_LEN)];
        // The buffer is sized from the header itself so this cannot fail
        let _ = self.serialize(&mut buf);
        buf
    }

    /// Parse a byte array into a `TcpHeader`. Bytes after the header (the payload) are ignored.
    pub fn parse(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < MIN_HEADER_LEN {
            return Err(HeaderError::BufferTooSmall { expected: MIN_HEADER_LEN, found: buf.len() });
        }

        let src_port = u16::from_be_bytes([buf[0], buf[1]]);
        let dst_port = u16::from_be_bytes([buf[2], buf[3]]);
        let seq_no = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ack_no = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let data_offset = buf[12] >> 4;
        let reserved = (buf[12] >> 1) & 0x07;
        let flags = TcpFlags::from_wire(buf[12] & 0x01 != 0, buf[13]);
        let window = u16::from_be_bytes([buf[14], buf[15]]);
        let checksum = u16::from_be_bytes([buf[16], buf[17]]);
        let urgent = u16::from_be_bytes([buf[18], buf[19]]);

        if data_offset < 5 {
            return Err(HeaderError::InvalidHeaderLength(data_offset));
        }

        let header_len = data_offset as usize * 4;
        if buf.len() < header_len {
            return Err(HeaderError::BufferTooSmall { expected: header_len, found: buf.len() });
        }

        Ok(TcpHeader {
            src_port,
            dst_port,
            seq_no: Wrap32::new(seq_no),
            ack_no: Wrap32::new(ack_no),
            data_offset,
            reserved,
            flags,
            window,
            checksum,
            urgent,
            options: buf[MIN_HEADER_LEN..header_len].to_vec(),
        })
    }

    /// Compute the checksum for this header and `payload`, with the checksum field taken as zero.
    pub fn compute_checksum(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr, payload: &[u8]) -> u16 {
        let mut segment = self.to_bytes();
        segment[16..18].fill(0);
        segment.extend_from_slice(payload);
        checksum::transport_checksum(src_ip, dst_ip, PROTOCOL_TCP, &segment)
    }

    // -- Options --

    /// Option values decoded from the raw option bytes.
    pub fn decoded_options(&self) -> TcpOptions {
        TcpOptions::decode(&self.options)
    }

    pub fn max_segment_size(&self) -> Option<u16> {
        self.decoded_options().max_segment_size
    }

    pub fn window_scale(&self) -> Option<u8> {
        self.decoded_options().window_scale
    }

    pub fn sack_permitted(&self) -> bool {
        self.decoded_options().sack_permitted
    }

    pub fn timestamp(&self) -> Option<(u32, u32)> {
        self.decoded_options().timestamp
    }

    /// Rewrite the timestamp option values, if the header carries one.
    pub fn set_timestamp(&mut self, sender: u32, reply_to: u32) -> bool {
        tcp_options::rewrite_timestamp(&mut self.options, sender, reply_to)
    }

    /// Replace the option bytes, padding them to a 4-byte boundary and updating the data offset.
    pub fn set_options(&mut self, options: &[u8]) {
        let mut options = options.to_vec();
        options.resize(options.len().div_ceil(4) * 4, 0);
        self.data_offset = 5 + (options.len() / 4) as u8;
        self.options = options;
    }

    pub fn clear_options(&mut self) {
        self.set_options(&[]);
    }

    // -- Flags --

    /// The wire flags byte (byte 13).
    pub fn flags_byte(&self) -> u8 {
        self.flags.flags_byte()
    }

    pub fn set_flag(&mut self, flag: TcpFlags, value: bool) {
        self.flags.set(flag, value);
    }

    pub fn is_ns(&self) -> bool {
        self.flags.contains(TcpFlags::NS)
    }

    pub fn is_cwr(&self) -> bool {
        self.flags.contains(TcpFlags::CWR)
    }

    pub fn is_ece(&self) -> bool {
        self.flags.contains(TcpFlags::ECE)
    }

    pub fn is_urg(&self) -> bool {
        self.flags.contains(TcpFlags::URG)
    }

    pub fn is_ack(&self) -> bool {
        self.flags.contains(TcpFlags::ACK)
    }

    pub fn is_psh(&self) -> bool {
        self.flags.contains(TcpFlags::PSH)
    }

    pub fn is_rst(&self) -> bool {
        self.flags.contains(TcpFlags::RST)
    }

    pub fn is_syn(&self) -> bool {
        self.flags.contains(TcpFlags::SYN)
    }

    pub fn is_fin(&self) -> bool {
        self.flags.contains(TcpFlags::FIN)
    }

    pub fn set_ns(&mut self, value: bool) {
        self.set_flag(TcpFlags::NS, value);
    }

    pub fn set_cwr(&mut self, value: bool) {
        self.set_flag(TcpFlags::CWR, value);
    }

    pub fn set_ece(&mut self, value: bool) {
        self.set_flag(TcpFlags::ECE, value);
    }

    pub fn set_urg(&mut self, value: bool) {
        self.set_flag(TcpFlags::URG, value);
    }

    pub fn set_ack(&mut self, value: bool) {
        self.set_flag(TcpFlags::ACK, value);
    }

    pub fn set_psh(&mut self, value: bool) {
        self.set_flag(TcpFlags::PSH, value);
    }

    pub fn set_rst(&mut self, value: bool) {
        self.set_flag(TcpFlags::RST, value);
    }

    pub fn set_syn(&mut self, value: bool) {
        self.set_flag(TcpFlags::SYN, value);
    }

    pub fn set_fin(&mut self, value: bool) {
        self.set_flag(TcpFlags::FIN, value);
    }
}

// -- Unit tests --

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::ip_header::Ipv4Header;
    use crate::packet::test_utils;

    fn wireshark_syn() -> TcpHeader {
        TcpHeader {
            src_port: 50871,
            dst_port: 80,
            seq_no: Wrap32::new(2753993875),
            ack_no: Wrap32::new(0),
            data_offset: 11,
            reserved: 0,
            flags: TcpFlags::SYN,
            window: 65535,
            checksum: 37527,
            urgent: 0,
            options: hex::decode("020405b4010303060101080abb6879f80000000004020000").unwrap(),
        }
    }

    #[test]
    fn test_tcp_header_to_bytes() {
        let tcp_header = wireshark_syn();

        // Get the IP header in order to build TCP header
        let ip_bytes = hex::decode(test_utils::get_ip_hex()).unwrap();
        let iph = Ipv4Header::parse(&ip_bytes).unwrap();

        let mut buf = vec![0u8; 1024];
        let n = tcp_header.serialize(&mut buf).unwrap();
        assert_eq!(n, 44);

        // Verify that checksum is 0
        let checksum = checksum::transport_checksum(iph.src_ip, iph.dst_ip, PROTOCOL_TCP, &buf[..n]);
        assert_eq!(checksum, 0);
        assert_eq!(tcp_header.compute_checksum(iph.src_ip, iph.dst_ip, &[]), 37527);

        // Check that constructed data is equal to wireshark data
        let tcp_bytes = hex::decode(test_utils::get_tcp_hex()).unwrap();
        assert_eq!(buf[..n], tcp_bytes)
    }

    #[test]
    fn test_tcp_header_from_bytes() {
        let tcp_bytes = hex::decode(test_utils::get_tcp_hex()).unwrap();
        let tcph = TcpHeader::parse(&tcp_bytes).unwrap();

        assert_eq!(tcph, wireshark_syn());
        assert_eq!(tcph.header_len_bytes(), 44);
        assert!(tcph.is_syn());
        assert!(!tcph.is_ack());
        assert_eq!(tcph.max_segment_size(), Some(1460));
        assert_eq!(tcph.window_scale(), Some(6));
        assert!(tcph.sack_permitted());
        assert_eq!(tcph.timestamp(), Some((3144184312, 0)));
    }

    #[test]
    fn test_roundtrip_all_fields() {
        let header = TcpHeader {
            src_port: 80,
            dst_port: 50871,
            seq_no: Wrap32::new(1654659911),
            ack_no: Wrap32::new(2753994376),
            data_offset: 8,
            reserved: 0b101,
            flags: TcpFlags::NS | TcpFlags::ACK | TcpFlags::PSH,
            window: 235,
            checksum: 29098,
            urgent: 7,
            options: hex::decode("0101080abeb95f0abb687a45").unwrap(),
        };

        let bytes = header.to_bytes();
        assert_eq!(bytes[12], 0x8b);
        assert_eq!(bytes[13], 0x18);
        assert_eq!(TcpHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_set_ack_after_syn() {
        let mut header = TcpHeader {
            flags: TcpFlags::SYN,
            ..Default::default()
        };
        header.set_ack(true);

        assert_eq!(header.flags_byte(), 0x12);
        assert!(header.is_syn());
        assert!(header.is_ack());
    }

    #[test]
    fn test_each_flag_toggle_restores_byte() {
        let accessors: [(fn(&mut TcpHeader, bool), fn(&TcpHeader) -> bool); 8] = [
            (TcpHeader::set_fin, TcpHeader::is_fin),
            (TcpHeader::set_syn, TcpHeader::is_syn),
            (TcpHeader::set_rst, TcpHeader::is_rst),
            (TcpHeader::set_psh, TcpHeader::is_psh),
            (TcpHeader::set_ack, TcpHeader::is_ack),
            (TcpHeader::set_urg, TcpHeader::is_urg),
            (TcpHeader::set_ece, TcpHeader::is_ece),
            (TcpHeader::set_cwr, TcpHeader::is_cwr),
        ];

        for original in [0x00u8, 0x12, 0xa5, 0xff] {
            for (set, get) in accessors {
                let mut header = TcpHeader {
                    flags: TcpFlags::from_wire(false, original),
                    ..Default::default()
                };
                let was_set = get(&header);

                set(&mut header, !was_set);
                assert_eq!(get(&header), !was_set);
                assert_ne!(header.flags_byte(), original);

                set(&mut header, was_set);
                assert_eq!(header.flags_byte(), original);
            }
        }
    }

    #[test]
    fn test_ns_lives_outside_flags_byte() {
        let mut header = TcpHeader {
            flags: TcpFlags::ACK,
            ..Default::default()
        };
        header.set_ns(true);
        assert!(header.is_ns());
        assert_eq!(header.flags_byte(), 0x10);
        assert_eq!(header.to_bytes()[12], 0x51);
    }

    #[test]
    fn test_flag_set_then_clear_restores_original() {
        for bit in 0..8 {
            let flag = TcpFlags::from_bits_truncate(1 << bit);
            let mut header = TcpHeader {
                flags: TcpFlags::from_wire(false, 0x00),
                ..Default::default()
            };
            header.set_flag(flag, true);
            assert_eq!(header.flags_byte(), 1 << bit);
            header.set_flag(flag, false);
            assert_eq!(header.flags_byte(), 0x00);
        }
    }

    #[test]
    fn test_set_timestamp_rewrites_options() {
        let mut header = wireshark_syn();
        assert!(header.set_timestamp(42, 3144184312));
        assert_eq!(header.timestamp(), Some((42, 3144184312)));
        assert_eq!(header.max_segment_size(), Some(1460));
        assert_eq!(header.header_len_bytes(), 44);
    }

    #[test]
    fn test_set_and_clear_options() {
        let mut header = TcpHeader::default();
        header.set_options(&[0x02, 0x04, 0x05, 0xb4, 0x01]);
        assert_eq!(header.data_offset, 7);
        assert_eq!(header.options.len(), 8);

        header.clear_options();
        assert_eq!(header.data_offset, 5);
        assert!(header.options.is_empty());
        assert_eq!(header.to_bytes().len(), 20);
    }

    #[test]
    fn test_parse_errors() {
        let tcp_bytes = hex::decode(test_utils::get_tcp_hex()).unwrap();
        assert_eq!(
            TcpHeader::parse(&tcp_bytes[..19]),
            Err(HeaderError::BufferTooSmall { expected: 20, found: 19 })
        );
        assert_eq!(
            TcpHeader::parse(&tcp_bytes[..40]),
            Err(HeaderError::BufferTooSmall { expected: 44, found: 40 })
        );

        let mut bad_offset = tcp_bytes.clone();
        bad_offset[12] = 0x40;
        assert_eq!(TcpHeader::parse(&bad_offset), Err(HeaderError::InvalidHeaderLength(4)));
    }
}
