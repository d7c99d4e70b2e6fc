use crate::ip::ip_header::PROTOCOL_UDP;
use crate::packet::checksum;
use crate::packet::errors::HeaderError;
use std::net::Ipv4Addr;

/// Length of a UDP header in bytes.
pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16, // Header plus payload
    pub checksum: u16,
}

impl UdpHeader {
    pub fn header_len_bytes(&self) -> usize {
        HEADER_LEN
    }

    /// Serialize a `UdpHeader` into `buf`, returning the number of bytes written.
    pub fn serialize(&self, buf: &mut [u8]) -> Result<usize, HeaderError> {
        if buf.len() < HEADER_LEN {
            return Err(HeaderError::BufferTooSmall { expected: HEADER_LEN, found: buf.len() });
        }
        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..6].copy_from_slice(&self.length.to_be_bytes());
        buf[6..8].copy_from_slice(&self.checksum.to_be_bytes());
        Ok(HEADER_LEN)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN];
        let _ = self.serialize(&mut buf);
        buf
    }

    /// Parse a byte array into a `UdpHeader`.
    pub fn parse(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < HEADER_LEN {
            return Err(HeaderError::BufferTooSmall { expected: HEADER_LEN, found: buf.len() });
        }
        let length = u16::from_be_bytes([buf[4], buf[5]]);
        if (length as usize) < HEADER_LEN {
            return Err(HeaderError::InvalidTotalLength(length));
        }
        Ok(UdpHeader {
            src_port: u16::from_be_bytes([buf[0], buf[1]]),
            dst_port: u16::from_be_bytes([buf[2], buf[3]]),
            length,
            checksum: u16::from_be_bytes([buf[6], buf[7]]),
        })
    }

    /// Compute the checksum for this header and `payload`. A computed zero is sent as 0xffff (RFC 768).
    pub fn compute_checksum(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr, payload: &[u8]) -> u16 {
        let mut segment = self.to_bytes();
        segment[6..8].fill(0);
        segment.extend_from_slice(payload);
        match checksum::transport_checksum(src_ip, dst_ip, PROTOCOL_UDP, &segment) {
            0 => 0xffff,
            sum => sum,
        }
    }
}

// -- Unit tests --
