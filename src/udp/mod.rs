pub mod udp_header;
