use crate::pcap::errors::CaptureError;
use crate::pcap::file_header::ByteOrder;

pub const RECORD_HEADER_LEN: usize = 16;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Per-packet header. Always written little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PcapRecordHeader {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub caplen: u32,
    pub len: u32,
}

impl PcapRecordHeader {
    /// Header for a whole frame of `frame_len` bytes captured at `timestamp_nanos`.
    pub fn from_nanos(timestamp_nanos: u64, frame_len: u32) -> Self {
        PcapRecordHeader {
            ts_sec: (timestamp_nanos / NANOS_PER_SEC) as u32,
            ts_usec: (timestamp_nanos / 1000 % 1_000_000) as u32,
            caplen: frame_len,
            len: frame_len,
        }
    }

    pub fn timestamp_nanos(&self) -> u64 {
        self.ts_sec as u64 * NANOS_PER_SEC + self.ts_usec as u64 * 1000
    }

    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_LEN] {
        let mut buf = [0u8; RECORD_HEADER_LEN];
        buf[0..4].copy_from_slice(&self.ts_sec.to_le_bytes());
        buf[4..8].copy_from_slice(&self.ts_usec.to_le_bytes());
        buf[8..12].copy_from_slice(&self.caplen.to_le_bytes());
        buf[12..16].copy_from_slice(&self.len.to_le_bytes());
        buf
    }

    pub fn parse(buf: &[u8], order: ByteOrder) -> Result<Self, CaptureError> {
        if buf.len() < RECORD_HEADER_LEN {
            return Err(CaptureError::Truncated {
                expected: RECORD_HEADER_LEN,
                found: buf.len(),
            });
        }
        Ok(PcapRecordHeader {
            ts_sec: order.read_u32(&buf[0..4]),
            ts_usec: order.read_u32(&buf[4..8]),
            caplen: order.read_u32(&buf[8..12]),
            len: order.read_u32(&buf[12..16]),
        })
    }
}
