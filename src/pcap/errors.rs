use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Not a pcap file, magic {0:#010x}")]
    BadMagic(u32),

    #[error("Truncated capture: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("Packet of {0} bytes exceeds the maximum capture size")]
    PacketTooLarge(usize),
}
