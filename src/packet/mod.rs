pub mod checksum;
pub mod errors;
pub mod factory;

use crate::ip::ip_header::{Ipv4Header, PROTOCOL_TCP, PROTOCOL_UDP};
use crate::packet::errors::HeaderError;
use crate::session::flow::FlowKey;
use crate::tcp::tcp_header::TcpHeader;
use crate::udp::udp_header::UdpHeader;

/// The transport layer header carried by an IPv4 packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportHeader {
    Tcp(TcpHeader),
    Udp(UdpHeader),
}

impl TransportHeader {
    pub fn header_len_bytes(&self) -> usize {
        match self {
            TransportHeader::Tcp(tcph) => tcph.header_len_bytes(),
            TransportHeader::Udp(udph) => udph.header_len_bytes(),
        }
    }

    pub fn src_port(&self) -> u16 {
        match self {
            TransportHeader::Tcp(tcph) => tcph.src_port,
            TransportHeader::Udp(udph) => udph.src_port,
        }
    }

    pub fn dst_port(&self) -> u16 {
        match self {
            TransportHeader::Tcp(tcph) => tcph.dst_port,
            TransportHeader::Udp(udph) => udph.dst_port,
        }
    }

    pub fn protocol(&self) -> u8 {
        match self {
            TransportHeader::Tcp(_) => PROTOCOL_TCP,
            TransportHeader::Udp(_) => PROTOCOL_UDP,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            TransportHeader::Tcp(tcph) => tcph.to_bytes(),
            TransportHeader::Udp(udph) => udph.to_bytes(),
        }
    }
}

/// A parsed IPv4 packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub ip: Ipv4Header,
    pub transport: TransportHeader,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn tcp(&self) -> Option<&TcpHeader> {
        match &self.transport {
            TransportHeader::Tcp(tcph) => Some(tcph),
            TransportHeader::Udp(_) => None,
        }
    }

    pub fn udp(&self) -> Option<&UdpHeader> {
        match &self.transport {
            TransportHeader::Udp(udph) => Some(udph),
            TransportHeader::Tcp(_) => None,
        }
    }

    /// The flow this packet belongs to, from the sender's point of view.
    pub fn flow_key(&self) -> FlowKey {
        FlowKey::new(self.ip.src_ip, self.transport.src_port(), self.ip.dst_ip, self.transport.dst_port())
    }

    /// Serialize every field as stored, checksums and lengths included.
    pub fn to_bytes(&self) -> Vec<u8> {
        [self.ip.to_bytes(), self.transport.to_bytes(), self.payload.clone()].concat()
    }

    /// Fill in the protocol, lengths and checksums from the headers and payload.
    pub fn seal(&mut self) {
        let ip = &mut self.ip;
        ip.protocol = self.transport.protocol();
        ip.total_len = (ip.header_len_bytes() + self.transport.header_len_bytes() + self.payload.len()) as u16;
        ip.checksum = ip.compute_checksum();

        match &mut self.transport {
            TransportHeader::Tcp(tcph) => {
                tcph.checksum = tcph.compute_checksum(ip.src_ip, ip.dst_ip, &self.payload);
            }
            TransportHeader::Udp(udph) => {
                udph.length = (udph.header_len_bytes() + self.payload.len()) as u16;
                udph.checksum = udph.compute_checksum(ip.src_ip, ip.dst_ip, &self.payload);
            }
        }
    }

    /// Check the IP header checksum and the transport checksum. A zero UDP checksum means none was sent.
    pub fn verify_checksums(&self) -> Result<(), HeaderError> {
        if self.ip.compute_checksum() != self.ip.checksum {
            return Err(HeaderError::BadChecksum("IP header".to_string()));
        }
        let ok = match &self.transport {
            TransportHeader::Tcp(tcph) => {
                tcph.compute_checksum(self.ip.src_ip, self.ip.dst_ip, &self.payload) == tcph.checksum
            }
            TransportHeader::Udp(udph) => {
                udph.checksum == 0
                    || udph.compute_checksum(self.ip.src_ip, self.ip.dst_ip, &self.payload) == udph.checksum
            }
        };
        if !ok {
            return Err(HeaderError::BadChecksum(format!("transport, protocol {}", self.ip.protocol)));
        }
        Ok(())
    }
}

/// Serialize an IPv4 packet, filling in the total length, UDP length and both checksums.
pub fn wrap(ip: &Ipv4Header, transport: &TransportHeader, payload: &[u8]) -> Vec<u8> {
    let mut packet = Packet {
        ip: ip.clone(),
        transport: transport.clone(),
        payload: payload.to_vec(),
    };
    packet.seal();
    packet.to_bytes()
}

/// Parse a whole IPv4 packet into its headers and payload.
pub fn unwrap(packet: &[u8]) -> Result<Packet, HeaderError> {
    let ip = Ipv4Header::parse(packet)?;

    let total_len = ip.total_len as usize;
    if total_len > packet.len() {
        return Err(HeaderError::BufferTooSmall { expected: total_len, found: packet.len() });
    }

    let ip_len = ip.header_len_bytes();
    let transport = match ip.protocol {
        PROTOCOL_TCP => TransportHeader::Tcp(TcpHeader::parse(&packet[ip_len..])?),
        PROTOCOL_UDP => TransportHeader::Udp(UdpHeader::parse(&packet[ip_len..])?),
        other => return Err(HeaderError::UnsupportedProtocol(other)),
    };

    let headers_len = ip_len + transport.header_len_bytes();
    if total_len < headers_len {
        return Err(HeaderError::InvalidTotalLength(ip.total_len));
    }

    Ok(Packet {
        payload: packet[headers_len..total_len].to_vec(),
        ip,
        transport,
    })
}

// Unit test helpers


// -- Unit tests --
