//! Relay TCP/UDP flows seen on a virtual interface through per-flow sessions, and mirror every packet to a pcap file.

pub mod config;
pub mod ip;
pub mod packet;
pub mod pcap;
pub mod session;
pub mod tcp;
pub mod udp;
