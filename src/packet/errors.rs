use thiserror::Error;

/// Malformed header input. Fatal for the packet being parsed: drop it, never guess a layout.
#[derive(Debug, PartialEq, Error)]
pub enum HeaderError {
    #[error("Buffer too small: expected {expected} bytes, found {found} bytes")]
    BufferTooSmall { expected: usize, found: usize },

    #[error("Invalid IP version: {0}")]
    InvalidVersion(u8),

    #[error("Invalid header length: {0} words")]
    InvalidHeaderLength(u8),

    #[error("Invalid total length: {0}")]
    InvalidTotalLength(u16),

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(u8),

    #[error("Bad checksum: {0}")]
    BadChecksum(String),
}
