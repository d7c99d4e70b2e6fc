use crate::ip::ip_flags::Ipv4Flags;
use crate::packet::checksum;
use crate::packet::errors::HeaderError;
use std::net::Ipv4Addr;

pub const PROTOCOL_TCP: u8 = 6;
pub const PROTOCOL_UDP: u8 = 17;

/// Minimum length of an IPv4 header in bytes.
pub const MIN_HEADER_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8, // Always 4
    pub ihl: u8,     // Header length in 4-byte words
    pub dscp: u8,    // 6 bits
    pub ecn: u8,     // 2 bits
    pub total_len: u16,
    pub id: u16,
    pub flags: Ipv4Flags, // DF and MF bits of the dedicated flag byte
    pub frag_offset: u16, // 13 bits
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub options: Vec<u8>, // Raw bytes between byte 20 and the declared header length
}

impl Ipv4Header {
    /// Header length in bytes, as declared by the IHL field.
    pub fn header_len_bytes(&self) -> usize {
        self.ihl as usize * 4
    }

    /// Don't Fragment.
    pub fn may_fragment(&self) -> bool {
        self.flags.contains(Ipv4Flags::DF)
    }

    /// More Fragments.
    pub fn last_fragment(&self) -> bool {
        self.flags.contains(Ipv4Flags::MF)
    }

    pub fn set_may_fragment(&mut self, value: bool) {
        self.flags.set(Ipv4Flags::DF, value);
    }

    pub fn set_last_fragment(&mut self, value: bool) {
        self.flags.set(Ipv4Flags::MF, value);
    }

    /// Serialize an `Ipv4Header` into `buf`, returning the number of bytes written.
    ///
    /// The checksum field is written as stored; use [`Ipv4Header::compute_checksum`] to refresh it.
    pub fn serialize(&self, buf: &mut [u8]) -> Result<usize, HeaderError> {
        let header_len = self.header_len_bytes().max(MIN_HEADER_LEN);
        if buf.len() < header_len {
            return Err(HeaderError::BufferTooSmall { expected: header_len, found: buf.len() });
        }

        buf[0] = (self.version << 4) | (self.ihl & 0x0f);
        buf[1] = (self.dscp << 2) | (self.ecn & 0x03);
        buf[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        buf[4..6].copy_from_slice(&self.id.to_be_bytes());
        buf[6..8].copy_from_slice(&self.flags.pack(self.frag_offset).to_be_bytes());
        buf[8] = self.ttl;
        buf[9] = self.protocol;
        buf[10..12].copy_from_slice(&self.checksum.to_be_bytes());
        buf[12..16].copy_from_slice(&self.src_ip.octets());
        buf[16..20].copy_from_slice(&self.dst_ip.octets());

        // Options are zero padded (or cut) to the declared header length
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

    /// Parse a byte array into an `Ipv4Header`.
    pub fn parse(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < MIN_HEADER_LEN {
            return Err(HeaderError::BufferTooSmall { expected: MIN_HEADER_LEN, found: buf.len() });
        }

        let version = buf[0] >> 4;
        if version != 4 {
            return Err(HeaderError::InvalidVersion(version));
        }

        let ihl = buf[0] & 0x0f;
        if ihl < 5 {
            return Err(HeaderError::InvalidHeaderLength(ihl));
        }

        let header_len = ihl as usize * 4;
        if buf.len() < header_len {
            return Err(HeaderError::BufferTooSmall { expected: header_len, found: buf.len() });
        }

        let dscp = buf[1] >> 2;
        let ecn = buf[1] & 0x03;
        let total_len = u16::from_be_bytes([buf[2], buf[3]]);
        let id = u16::from_be_bytes([buf[4], buf[5]]);
        let (flags, frag_offset) = Ipv4Flags::unpack(u16::from_be_bytes([buf[6], buf[7]]));
        let ttl = buf[8];
        let protocol = buf[9];
        let checksum = u16::from_be_bytes([buf[10], buf[11]]);
        let src_ip = Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]);
        let dst_ip = Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]);
        let options = buf[MIN_HEADER_LEN..header_len].to_vec();

        Ok(Ipv4Header {
            version,
            ihl,
            dscp,
            ecn,
            total_len,
            id,
            flags,
            frag_offset,
            ttl,
            protocol,
            checksum,
            src_ip,
            dst_ip,
            options,
        })
    }

    /// Compute the header checksum with the checksum field taken as zero.
    pub fn compute_checksum(&self) -> u16 {
        let mut bytes = self.to_bytes();
        bytes[10..12].fill(0);
        checksum::internet_checksum(&bytes)
    }
}

impl Default for Ipv4Header {
    fn default() -> Self {
        Ipv4Header {
            version: 4,
            ihl: 5,
            dscp: 0,
            ecn: 0,
            total_len: 0,
            id: 0,
            flags: Ipv4Flags::DF,
            frag_offset: 0,
            ttl: 64,
            protocol: 0,
            checksum: 0,
            src_ip: Ipv4Addr::UNSPECIFIED,
            dst_ip: Ipv4Addr::UNSPECIFIED,
            options: Vec::new(),
        }
    }
}

// -- Unit tests --

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::test_utils;

    #[test]
    fn test_ip_header_to_bytes() {
        let header = Ipv4Header {
            version: 4,
            ihl: 5,
            dscp: 0,
            ecn: 0,
            total_len: 64,
            id: 0,
            flags: Ipv4Flags::DF,
            frag_offset: 0,
            ttl: 64,
            protocol: 6,
            checksum: 54134,
            src_ip: Ipv4Addr::new(10, 110, 208, 106),
            dst_ip: Ipv4Addr::new(204, 44, 192, 60),
            options: vec![],
        };

        let mut buf = vec![0u8; 64];
        let n = header.serialize(&mut buf).unwrap();
        assert_eq!(n, 20);

        // Verify that checksum is 0
        assert_eq!(checksum::internet_checksum(&buf[..n]), 0);
        assert_eq!(header.compute_checksum(), 54134);

        let ip_bytes = hex::decode(test_utils::get_ip_hex()).unwrap();
        assert_eq!(buf[..n], ip_bytes);
    }

    #[test]
    fn test_ip_header_from_bytes() {
        let ip_bytes = hex::decode(test_utils::get_ip_hex()).unwrap();
        let iph = Ipv4Header::parse(&ip_bytes).unwrap();

        assert_eq!(iph.version, 4);
        assert_eq!(iph.ihl, 5);
        assert_eq!(iph.header_len_bytes(), 20);
        assert_eq!(iph.dscp, 0);
        assert_eq!(iph.ecn, 0);
        assert_eq!(iph.total_len, 64);
        assert_eq!(iph.id, 0);
        assert_eq!(iph.flags, Ipv4Flags::DF);
        assert!(iph.may_fragment());
        assert!(!iph.last_fragment());
        assert_eq!(iph.frag_offset, 0);
        assert_eq!(iph.ttl, 64);
        assert_eq!(iph.protocol, 6);
        assert_eq!(iph.checksum, 54134);
        assert_eq!(iph.src_ip, Ipv4Addr::new(10, 110, 208, 106));
        assert_eq!(iph.dst_ip, Ipv4Addr::new(204, 44, 192, 60));
    }

    #[test]
    fn test_scenario_tcp_header_roundtrip() {
        let header = Ipv4Header {
            protocol: PROTOCOL_TCP,
            src_ip: Ipv4Addr::new(10, 0, 0, 2),
            dst_ip: Ipv4Addr::new(93, 184, 216, 34),
            total_len: 40,
            ..Default::default()
        };

        let parsed = Ipv4Header::parse(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.version, 4);
        assert_eq!(parsed.ihl, 5);
        assert_eq!(parsed.protocol, 6);
        assert_eq!(parsed.src_ip, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(parsed.dst_ip, Ipv4Addr::new(93, 184, 216, 34));
    }

    #[test]
    fn test_roundtrip_with_options_and_fragments() {
        let header = Ipv4Header {
            ihl: 6,
            dscp: 0x2e,
            ecn: 0x01,
            total_len: 1500,
            id: 0xbeef,
            flags: Ipv4Flags::MF,
            frag_offset: 0x1234,
            ttl: 1,
            protocol: PROTOCOL_UDP,
            checksum: 0xabcd,
            src_ip: Ipv4Addr::new(192, 168, 1, 13),
            dst_ip: Ipv4Addr::new(8, 8, 8, 8),
            options: vec![0x01, 0x01, 0x01, 0x00],
            ..Default::default()
        };

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 24);
        assert_eq!(bytes[1], 0xb9);
        assert_eq!(bytes[6], 0x32);
        assert_eq!(Ipv4Header::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_flag_setters() {
        let mut header = Ipv4Header::default();
        header.set_may_fragment(false);
        header.set_last_fragment(true);
        assert_eq!(header.flags.bits(), 0x20);
        header.set_may_fragment(true);
        assert_eq!(header.flags.bits(), 0x60);
        header.set_last_fragment(false);
        assert_eq!(header.flags.bits(), 0x40);
    }

    #[test]
    fn test_parse_too_short() {
        let ip_bytes = hex::decode(test_utils::get_ip_hex()).unwrap();
        assert_eq!(
            Ipv4Header::parse(&ip_bytes[..19]),
            Err(HeaderError::BufferTooSmall { expected: 20, found: 19 })
        );
    }

    #[test]
    fn test_parse_declared_length_exceeds_buffer() {
        let mut ip_bytes = hex::decode(test_utils::get_ip_hex()).unwrap();
        ip_bytes[0] = 0x46;
        assert_eq!(
            Ipv4Header::parse(&ip_bytes),
            Err(HeaderError::BufferTooSmall { expected: 24, found: 20 })
        );
    }

    #[test]
    fn test_parse_rejects_ipv6_and_short_ihl() {
        let mut ip_bytes = hex::decode(test_utils::get_ip_hex()).unwrap();
        ip_bytes[0] = 0x65;
        assert_eq!(Ipv4Header::parse(&ip_bytes), Err(HeaderError::InvalidVersion(6)));

        ip_bytes[0] = 0x44;
        assert_eq!(Ipv4Header::parse(&ip_bytes), Err(HeaderError::InvalidHeaderLength(4)));
    }
}
