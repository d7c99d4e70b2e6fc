pub mod tcp_flags;
pub mod tcp_header;
pub mod tcp_options;
pub mod wrap32;
