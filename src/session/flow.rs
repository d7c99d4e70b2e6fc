use std::fmt;
use std::net::Ipv4Addr;

/// Key for identifying a flow. The source side is the client on the virtual interface.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub struct FlowKey {
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn new(src_ip: Ipv4Addr, src_port: u16, dst_ip: Ipv4Addr, dst_port: u16) -> Self {
        FlowKey {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
        }
    }

    /// The same flow seen from the other end.
    pub fn reversed(&self) -> Self {
        FlowKey::new(self.dst_ip, self.dst_port, self.src_ip, self.src_port)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} -> {}:{}", self.src_ip, self.src_port, self.dst_ip, self.dst_port)
    }
}
