//! Drives sessions from the packets a client writes to the virtual interface, and builds the packets that go back.
//!
//! Socket I/O toward the real destination is left to the caller: it drains [`Session::take_sending_data`], feeds
//! replies through [`Session::add_received_data`], then calls [`FlowHandler::push_to_client`].

use crate::packet::errors::HeaderError;
use crate::packet::{self, factory, Packet, TransportHeader};
use crate::pcap::writer::SharedCaptureWriter;
use crate::session::flow::FlowKey;
use crate::session::registry::SessionRegistry;
use crate::session::session::Session;
use crate::tcp::tcp_header::TcpHeader;
use crate::tcp::wrap32::Wrap32;
use crate::udp::udp_header::UdpHeader;
use log::{debug, info, warn};
use std::io;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Where packets for the client are written, typically the virtual interface.
pub trait ClientWriter: Send + Sync {
    fn write(&self, packet: &[u8]) -> io::Result<()>;
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Malformed packet: {0}")]
    Header(#[from] HeaderError),

    #[error("Failed to write to the client: {0}")]
    Io(#[from] io::Error),

    #[error("No headers recorded for session {0}")]
    MissingHeaders(FlowKey),

    #[error("Could not buffer client data for session {0}")]
    QueueFailed(FlowKey),
}

pub struct FlowHandler<W: ClientWriter> {
    registry: Arc<SessionRegistry>,
    writer: W,
    capture: Option<SharedCaptureWriter>,
}

impl<W: ClientWriter> FlowHandler<W> {
    pub fn new(registry: Arc<SessionRegistry>, writer: W, capture: Option<SharedCaptureWriter>) -> Self {
        FlowHandler {
            registry,
            writer,
            capture,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Handle one IP packet from the client. Malformed packets are dropped and reported.
    pub fn handle_packet(&self, bytes: &[u8], timestamp_nanos: u64) -> Result<(), HandlerError> {
        self.capture(bytes, timestamp_nanos);

        let packet = match packet::unwrap(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping packet of {} bytes: {}", bytes.len(), e);
                return Err(e.into());
            }
        };

        match &packet.transport {
            TransportHeader::Tcp(tcph) => self.handle_tcp(&packet, tcph),
            TransportHeader::Udp(udph) => self.handle_udp(&packet, udph),
        }
    }

    fn handle_tcp(&self, packet: &Packet, tcph: &TcpHeader) -> Result<(), HandlerError> {
        let key = packet.flow_key();
        let ip = &packet.ip;

        if tcph.is_syn() {
            return self.reply_syn_ack(packet, tcph);
        }

        if tcph.is_ack() {
            let Some(session) = self.registry.get(&key) else {
                if tcph.is_fin() {
                    self.send(&factory::ack(ip, tcph, tcph.seq_no + 1))?;
                } else if !tcph.is_rst() {
                    debug!("Unknown session {}, sending RST", key);
                    self.send(&factory::rst(ip, tcph, packet.payload.len() as u32))?;
                } else {
                    debug!("RST for unknown session {}", key);
                }
                return Ok(());
            };

            session.set_last_tcp_headers(ip.clone(), tcph.clone());

            if !packet.payload.is_empty() {
                self.accept_client_data(&session, packet, tcph)?;
            } else {
                session.accept_ack(tcph, factory::timestamp_now());

                if session.is_closing_connection() {
                    self.send_fin_ack(&session, packet, tcph)?;
                } else if session.is_ack_to_fin() && !tcph.is_fin() {
                    self.registry.close(&key);
                    debug!("Last ACK after FIN, {} closed", key);
                }
            }

            if tcph.is_psh() {
                let mut control = session.control();
                if let Some((sender, _)) = tcph.timestamp() {
                    control.timestamp_reply_to = sender;
                }
                control.timestamp_sender = factory::timestamp_now();
                drop(control);
                session.set_data_for_sending_ready(true);
                debug!("{} bytes ready for {}", session.sending_data_size(), key);
            } else if tcph.is_fin() {
                self.ack_client_fin(packet, tcph, Some(session.as_ref()))?;
            } else if tcph.is_rst() {
                self.reset(&key);
            }
            return Ok(());
        }

        if tcph.is_fin() {
            if self.registry.get(&key).is_none() {
                self.ack_client_fin(packet, tcph, None)?;
            }
        } else if tcph.is_rst() {
            self.reset(&key);
        } else {
            debug!("Ignoring segment with flags {:#04x} from {}", tcph.flags_byte(), key);
        }
        Ok(())
    }

    /// New session from a client SYN.
    fn reply_syn_ack(&self, packet: &Packet, tcph: &TcpHeader) -> Result<(), HandlerError> {
        let key = packet.flow_key();
        let Some(session) = self.registry.create_tcp(key) else {
            debug!("Duplicate SYN for {}", key);
            return Ok(());
        };

        let isn = factory::random_isn();
        let response = factory::syn_ack(&packet.ip, tcph, isn);
        {
            let mut control = session.control();
            control.set_send_window_size_and_scale(tcph.window as u32, tcph.decoded_options().window_scale_factor());
            control.max_segment_size = tcph.max_segment_size().unwrap_or(0);
            control.send_unack = isn;
            control.send_next = isn + 1;
            control.rec_sequence = tcph.seq_no + 1;
            if let Some((sender, _)) = tcph.timestamp() {
                control.timestamp_reply_to = sender;
            }
            debug!("{} send window {}, MSS {}", key, control.send_window, control.max_segment_size);
        }
        session.set_last_tcp_headers(packet.ip.clone(), tcph.clone());
        session.mark_handshaking();

        self.send(&response)
    }

    /// Buffer in-order payload for the destination and acknowledge it.
    fn accept_client_data(&self, session: &Session, packet: &Packet, tcph: &TcpHeader) -> Result<(), HandlerError> {
        let len = packet.payload.len() as u32;
        let rec_sequence = session.control().rec_sequence;

        if rec_sequence == Wrap32::ZERO || tcph.seq_no.is_at_or_after(rec_sequence) {
            let added = if session.queue_sending_data(&packet.payload) { len } else { 0 };
            let ack = {
                let mut control = session.control();
                control.rec_sequence = control.rec_sequence + added;
                control.rec_sequence
            };
            debug!("ACK {} after {} bytes from {}", ack, added, session.key());
            self.send(&factory::ack(&packet.ip, tcph, ack))
        } else {
            // Retransmission of data already buffered
            self.send(&factory::ack(&packet.ip, tcph, tcph.seq_no + len))
        }
    }

    /// FIN without ACK once the destination has finished. The client's next ACK closes the session.
    fn send_fin_ack(&self, session: &Session, packet: &Packet, tcph: &TcpHeader) -> Result<(), HandlerError> {
        let response = factory::fin_ack(&packet.ip, tcph, tcph.seq_no, tcph.ack_no, true, false);
        session.control().send_next = tcph.ack_no + 1;
        session.set_closing_connection(false);
        session.set_ack_to_fin(true);
        self.send(&response)
    }

    /// FIN-ACK answering the client's FIN, closing the session if there is one.
    fn ack_client_fin(&self, packet: &Packet, tcph: &TcpHeader, session: Option<&Session>) -> Result<(), HandlerError> {
        let response = factory::fin_ack(&packet.ip, tcph, tcph.seq_no + 1, tcph.ack_no, true, true);
        let result = self.send(&response);
        if let Some(session) = session {
            self.registry.close(&session.key());
            info!("Client closed {}", session.key());
        }
        result
    }

    fn reset(&self, key: &FlowKey) {
        if let Some(session) = self.registry.get(key) {
            debug!("Client reset {}", key);
            session.abort();
        }
    }

    /// Queue a datagram for the destination. A datagram that cannot be buffered tears the session down.
    fn handle_udp(&self, packet: &Packet, udph: &UdpHeader) -> Result<(), HandlerError> {
        let key = packet.flow_key();
        let session = self.registry.get_or_create_udp(key);
        session.set_last_udp_headers(packet.ip.clone(), udph.clone());
        if !session.queue_sending_data(&packet.payload) {
            warn!("Closing {} after a failed UDP queue", key);
            self.registry.close(&key);
            return Err(HandlerError::QueueFailed(key));
        }
        session.set_data_for_sending_ready(true);
        debug!("{} UDP bytes queued for {}", packet.payload.len(), key);
        Ok(())
    }

    /// Send buffered destination data to the client, one segment at a time, until the buffer is empty or the
    /// client's window is full. Returns the payload bytes delivered.
    pub fn push_to_client(&self, session: &Session) -> Result<usize, HandlerError> {
        let (ip, tcph) = session
            .last_tcp_headers()
            .ok_or_else(|| HandlerError::MissingHeaders(session.key()))?;
        let default_segment_size = self.registry.config().default_segment_size;

        let mut delivered = 0;
        while let Some(segment) = session.take_segment(default_segment_size) {
            let response = factory::data(
                &ip,
                &tcph,
                &segment.payload,
                segment.push,
                segment.ack,
                segment.seq,
                segment.timestamps,
            );
            self.send(&response)?;
            delivered += segment.payload.len();
        }
        if session.has_received_data() && session.is_client_window_full() {
            debug!("Client window full for {}, pausing", session.key());
        }
        Ok(delivered)
    }

    /// The destination closed its side: FIN to the client, then abort the session.
    pub fn send_fin_to_client(&self, session: &Session) -> Result<(), HandlerError> {
        let (ip, tcph) = session
            .last_tcp_headers()
            .ok_or_else(|| HandlerError::MissingHeaders(session.key()))?;

        let response = {
            let control = session.control();
            factory::fin(&ip, &tcph, control.rec_sequence, control.send_next)
        };
        let result = self.send(&response);
        session.abort();
        result
    }

    /// Send one datagram from the destination to the client.
    pub fn push_udp_to_client(&self, session: &Session, payload: &[u8]) -> Result<(), HandlerError> {
        if session.is_aborting() {
            return Ok(());
        }
        let (ip, udph) = session
            .last_udp_headers()
            .ok_or_else(|| HandlerError::MissingHeaders(session.key()))?;
        self.send(&factory::udp_response(&ip, &udph, payload))
    }

    fn send(&self, packet: &Packet) -> Result<(), HandlerError> {
        let bytes = packet.to_bytes();
        self.writer.write(&bytes)?;
        self.capture(&bytes, now_nanos());
        Ok(())
    }

    fn capture(&self, bytes: &[u8], timestamp_nanos: u64) {
        let Some(capture) = &self.capture else {
            return;
        };
        if let Err(e) = capture.add_packet(bytes, timestamp_nanos) {
            warn!("Failed to capture packet: {}", e);
        }
    }
}

/// Wall clock in nanoseconds since the Unix epoch.
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

// -- Unit tests --
