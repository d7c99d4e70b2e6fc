//! Capture files in the classic pcap format. Every IP packet is stored behind a synthetic Ethernet header.

pub mod errors;
pub mod ethernet;
pub mod file_header;
pub mod reader;
pub mod record_header;
pub mod writer;
