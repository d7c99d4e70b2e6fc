//! Builders for the packets sent back to the client.
//!
//! Every builder starts from the headers of the client's last packet, swaps source and destination, and returns a
//! sealed [`Packet`] (lengths and checksums filled in) ready to be written to the interface.

use crate::ip::ip_header::Ipv4Header;
use crate::packet::{Packet, TransportHeader};
use crate::tcp::tcp_flags::TcpFlags;
use crate::tcp::tcp_header::TcpHeader;
use crate::tcp::wrap32::Wrap32;
use crate::udp::udp_header::UdpHeader;
use log::debug;
use rand::Rng;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static PACKET_ID: AtomicU16 = AtomicU16::new(0);

/// Next IP identification, shared by every flow in the process.
pub fn next_packet_id() -> u16 {
    PACKET_ID.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
}

/// A random initial sequence number in `[0, 2^31)`.
pub fn random_isn() -> Wrap32 {
    Wrap32::new(rand::thread_rng().gen_range(0..=i32::MAX as u32))
}

/// Wall clock in milliseconds, truncated to 32 bits, for the TCP timestamp option.
pub fn timestamp_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

/// Copy the client's headers with addresses and ports swapped.
fn reply_headers(ip: &Ipv4Header, tcp: &TcpHeader) -> (Ipv4Header, TcpHeader) {
    let mut iph = ip.clone();
    iph.src_ip = ip.dst_ip;
    iph.dst_ip = ip.src_ip;
    iph.id = next_packet_id();

    let mut tcph = tcp.clone();
    tcph.src_port = tcp.dst_port;
    tcph.dst_port = tcp.src_port;

    (iph, tcph)
}

fn seal(ip: Ipv4Header, tcp: TcpHeader, payload: &[u8]) -> Packet {
    let mut packet = Packet {
        ip,
        transport: TransportHeader::Tcp(tcp),
        payload: payload.to_vec(),
    };
    packet.seal();
    packet
}

/// Echo the client's sender timestamp and stamp our own.
fn echo_timestamp(tcph: &mut TcpHeader, client: &TcpHeader) {
    if let Some((sender, _)) = client.timestamp() {
        tcph.set_timestamp(timestamp_now(), sender);
    }
}

/// SYN-ACK answering a client SYN. The acknowledgment is the client's sequence plus one.
pub fn syn_ack(ip: &Ipv4Header, tcp: &TcpHeader, isn: Wrap32) -> Packet {
    let (iph, mut tcph) = reply_headers(ip, tcp);
    tcph.ack_no = tcp.seq_no + 1;
    tcph.seq_no = isn;
    tcph.flags = TcpFlags::SYN | TcpFlags::ACK;
    echo_timestamp(&mut tcph, tcp);

    debug!("SYN-ACK with initial sequence number {}", isn);
    seal(iph, tcph, &[])
}

/// Pure ACK. The sequence number is the client's acknowledgment.
pub fn ack(ip: &Ipv4Header, tcp: &TcpHeader, ack_to_client: Wrap32) -> Packet {
    let (iph, mut tcph) = reply_headers(ip, tcp);
    tcph.seq_no = tcp.ack_no;
    tcph.ack_no = ack_to_client;
    tcph.flags = TcpFlags::ACK;
    echo_timestamp(&mut tcph, tcp);

    seal(iph, tcph, &[])
}

/// Data segment for the client. `timestamps` is `(sender, reply_to)`.
pub fn data(
    ip: &Ipv4Header,
    tcp: &TcpHeader,
    payload: &[u8],
    psh: bool,
    ack: Wrap32,
    seq: Wrap32,
    timestamps: (u32, u32),
) -> Packet {
    let (iph, mut tcph) = reply_headers(ip, tcp);
    tcph.ack_no = ack;
    tcph.seq_no = seq;
    tcph.flags = TcpFlags::ACK;
    tcph.set_psh(psh);
    tcph.set_timestamp(timestamps.0, timestamps.1);

    seal(iph, tcph, payload)
}

/// FIN sent when the remote end has closed. Options are dropped and the window is zero.
pub fn fin(ip: &Ipv4Header, tcp: &TcpHeader, ack: Wrap32, seq: Wrap32) -> Packet {
    let (iph, mut tcph) = reply_headers(ip, tcp);
    tcph.ack_no = ack;
    tcph.seq_no = seq;
    tcph.flags = TcpFlags::FIN | TcpFlags::ACK;
    tcph.clear_options();
    tcph.window = 0;

    seal(iph, tcph, &[])
}

/// FIN and/or ACK answering a client FIN.
pub fn fin_ack(ip: &Ipv4Header, tcp: &TcpHeader, ack: Wrap32, seq: Wrap32, fin: bool, ack_flag: bool) -> Packet {
    let (iph, mut tcph) = reply_headers(ip, tcp);
    tcph.ack_no = ack;
    tcph.seq_no = seq;
    tcph.flags = TcpFlags::empty();
    tcph.set_fin(fin);
    tcph.set_ack(ack_flag);
    echo_timestamp(&mut tcph, tcp);

    seal(iph, tcph, &[])
}

/// RST for a segment that belongs to no known session.
pub fn rst(ip: &Ipv4Header, tcp: &TcpHeader, data_len: u32) -> Packet {
    let (mut iph, mut tcph) = reply_headers(ip, tcp);
    iph.id = 0;

    if tcp.ack_no != Wrap32::ZERO {
        tcph.seq_no = tcp.ack_no;
        tcph.ack_no = Wrap32::ZERO;
    } else {
        tcph.seq_no = Wrap32::ZERO;
        tcph.ack_no = tcp.seq_no + data_len;
    }
    tcph.flags = TcpFlags::RST;
    tcph.clear_options();
    tcph.window = 0;

    seal(iph, tcph, &[])
}

/// UDP datagram for the client. DF is cleared and the checksum is left at zero.
pub fn udp_response(ip: &Ipv4Header, udp: &UdpHeader, payload: &[u8]) -> Packet {
    let mut iph = ip.clone();
    iph.src_ip = ip.dst_ip;
    iph.dst_ip = ip.src_ip;
    iph.id = next_packet_id();
    iph.set_may_fragment(false);

    let udph = UdpHeader {
        src_port: udp.dst_port,
        dst_port: udp.src_port,
        length: 0,
        checksum: 0,
    };

    let mut packet = Packet {
        ip: iph,
        transport: TransportHeader::Udp(udph),
        payload: payload.to_vec(),
    };
    packet.seal();
    if let TransportHeader::Udp(udph) = &mut packet.transport {
        udph.checksum = 0;
    }
    packet
}

// -- Unit tests --
