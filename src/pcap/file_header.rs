use crate::pcap::errors::CaptureError;

pub const FILE_HEADER_LEN: usize = 24;

/// Microsecond-resolution pcap magic.
pub const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
/// The same magic written in the opposite byte order.
pub const PCAP_MAGIC_SWAPPED: u32 = 0xd4c3_b2a1;

pub const LINKTYPE_ETHERNET: u32 = 1;

/// Byte order of the multi-byte fields of a capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn read_u16(self, b: &[u8]) -> u16 {
        let raw = [b[0], b[1]];
        match self {
            ByteOrder::Little => u16::from_le_bytes(raw),
            ByteOrder::Big => u16::from_be_bytes(raw),
        }
    }

    pub fn read_u32(self, b: &[u8]) -> u32 {
        let raw = [b[0], b[1], b[2], b[3]];
        match self {
            ByteOrder::Little => u32::from_le_bytes(raw),
            ByteOrder::Big => u32::from_be_bytes(raw),
        }
    }
}

/// The 24-byte global header. Written once at the start of every capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcapFileHeader {
    pub version_major: u16,
    pub version_minor: u16,
    pub thiszone: i32,
    pub sigfigs: u32,
    pub snaplen: u32,
    pub linktype: u32,
}

impl Default for PcapFileHeader {
    fn default() -> Self {
        PcapFileHeader {
            version_major: 2,
            version_minor: 4,
            thiszone: 0,
            sigfigs: 0,
            snaplen: 0xffff,
            linktype: LINKTYPE_ETHERNET,
        }
    }
}

impl PcapFileHeader {
    /// Little-endian with the canonical magic.
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_LEN] {
        let mut buf = [0u8; FILE_HEADER_LEN];
        buf[0..4].copy_from_slice(&PCAP_MAGIC.to_le_bytes());
        buf[4..6].copy_from_slice(&self.version_major.to_le_bytes());
        buf[6..8].copy_from_slice(&self.version_minor.to_le_bytes());
        buf[8..12].copy_from_slice(&self.thiszone.to_le_bytes());
        buf[12..16].copy_from_slice(&self.sigfigs.to_le_bytes());
        buf[16..20].copy_from_slice(&self.snaplen.to_le_bytes());
        buf[20..24].copy_from_slice(&self.linktype.to_le_bytes());
        buf
    }

    /// Parse a global header in either byte order. Any magic other than the canonical one or its byte-swapped form
    /// is fatal.
    pub fn parse(buf: &[u8]) -> Result<(Self, ByteOrder), CaptureError> {
        if buf.len() < FILE_HEADER_LEN {
            return Err(CaptureError::Truncated {
                expected: FILE_HEADER_LEN,
                found: buf.len(),
            });
        }

        let order = match ByteOrder::Little.read_u32(&buf[0..4]) {
            PCAP_MAGIC => ByteOrder::Little,
            PCAP_MAGIC_SWAPPED => ByteOrder::Big,
            other => return Err(CaptureError::BadMagic(other)),
        };

        let header = PcapFileHeader {
            version_major: order.read_u16(&buf[4..6]),
            version_minor: order.read_u16(&buf[6..8]),
            thiszone: order.read_u32(&buf[8..12]) as i32,
            sigfigs: order.read_u32(&buf[12..16]),
            snaplen: order.read_u32(&buf[16..20]),
            linktype: order.read_u32(&buf[20..24]),
        };
        Ok((header, order))
    }
}
