use crate::config::SessionConfig;
use crate::ip::ip_header::Ipv4Header;
use crate::pcap::writer::MAX_PACKET_SIZE;
use crate::session::byte_stream::ByteStream;
use crate::session::flow::FlowKey;
use crate::session::guard::{AbortSignal, BusyFlag, BusyGuard};
use crate::session::state::SessionState;
use crate::tcp::tcp_header::TcpHeader;
use crate::tcp::wrap32::Wrap32;
use crate::udp::udp_header::UdpHeader;
use log::{debug, error};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::time::Instant;

/// Payload bytes sent to the client before an ACK is required when no window was negotiated.
pub const UNNEGOTIATED_WINDOW_LIMIT: u64 = 65535;

/// Room left in a segment for the IP and TCP headers.
const SEGMENT_HEADER_ALLOWANCE: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

/// Readiness registration of the channel to the destination. Owned by the registry, opaque to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelToken(pub usize);

/// Sequence numbers, window and negotiated options of a TCP flow.
#[derive(Debug, Clone, Default)]
pub struct FlowControl {
    pub rec_sequence: Wrap32, // Next sequence number expected from the client
    pub send_unack: Wrap32,   // Oldest sequence number sent to the client and not acknowledged
    pub send_next: Wrap32,    // Next sequence number to send to the client
    pub send_window: u32,
    pub send_window_scale: u32, // Multiplication factor, not the shift count
    pub send_amount_since_last_ack: u64,
    pub max_segment_size: u16,
    pub timestamp_sender: u32,
    pub timestamp_reply_to: u32,
}

impl FlowControl {
    /// `send_window = size * scale`. A scale of 0 leaves no window negotiated.
    pub fn set_send_window_size_and_scale(&mut self, size: u32, scale: u32) {
        self.send_window_scale = scale;
        self.send_window = size.saturating_mul(scale);
    }

    pub fn is_client_window_full(&self) -> bool {
        let sent = self.send_amount_since_last_ack;
        (self.send_window > 0 && sent >= self.send_window as u64)
            || (self.send_window == 0 && sent > UNNEGOTIATED_WINDOW_LIMIT)
    }

    pub fn record_sent_to_client(&mut self, amount: usize) {
        self.send_amount_since_last_ack += amount as u64;
    }

    /// Payload size for segments pushed to the client.
    pub fn segment_size(&self, default: usize) -> usize {
        match (self.max_segment_size as usize).checked_sub(SEGMENT_HEADER_ALLOWANCE) {
            Some(size) if size >= 1 => size.min(MAX_PACKET_SIZE - SEGMENT_HEADER_ALLOWANCE),
            _ => default,
        }
    }

    /// Take an acknowledgment from the client if it moves `send_unack` forward or acknowledges everything sent.
    /// Never acknowledges past `send_next`, so `send_unack <= send_next` holds.
    pub fn accept_ack(&mut self, tcp: &TcpHeader, now_ms: u32) -> bool {
        let moves_forward = tcp.ack_no.is_after(self.send_unack) || tcp.ack_no == self.send_next;
        if !moves_forward || !self.send_next.is_at_or_after(tcp.ack_no) {
            debug!("Not accepting ack# {}, expected {} (unacked {})", tcp.ack_no, self.send_next, self.send_unack);
            return false;
        }

        if tcp.window > 0 {
            self.set_send_window_size_and_scale(tcp.window as u32, self.send_window_scale);
        }
        self.send_unack = tcp.ack_no;
        self.rec_sequence = tcp.seq_no;
        if let Some((sender, _)) = tcp.timestamp() {
            self.timestamp_reply_to = sender;
        }
        self.timestamp_sender = now_ms;
        self.send_amount_since_last_ack = 0;
        true
    }
}

/// Payload cut from the receive buffer, with the sequence space reserved for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSegment {
    pub payload: Vec<u8>,
    pub seq: Wrap32,
    pub ack: Wrap32,
    pub timestamps: (u32, u32), // (sender, reply to)
    pub push: bool,
}

#[derive(Debug, Default)]
struct LastHeaders {
    ip: Option<Ipv4Header>,
    tcp: Option<TcpHeader>,
    udp: Option<UdpHeader>,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    control: FlowControl,
    receiving: ByteStream, // From the destination, for the client. Unbounded
    receive_high_water: usize,
    sending: ByteStream,   // From the client, for the destination
    last: LastHeaders,
    channel: Option<ChannelToken>,
    closing_connection: bool,
    has_received_last_segment: bool,
    ack_to_fin: bool,
    data_for_sending_ready: bool,
}

/// One proxied flow. All mutable state sits behind a single lock; the busy flags and the abort signal are
/// lock-free so the reactor can poll them without contending with workers.
#[derive(Debug)]
pub struct Session {
    key: FlowKey,
    transport: Transport,
    created: Instant,
    inner: Mutex<SessionInner>,
    busy_read: BusyFlag,
    busy_write: BusyFlag,
    abort: AbortSignal,
}

impl Session {
    pub fn new(key: FlowKey, transport: Transport, config: &SessionConfig) -> Self {
        Session {
            key,
            transport,
            created: Instant::now(),
            inner: Mutex::new(SessionInner {
                state: SessionState::New,
                control: FlowControl::default(),
                receiving: ByteStream::unbounded(),
                receive_high_water: config.receive_buffer_capacity,
                sending: ByteStream::new(config.send_buffer_capacity),
                last: LastHeaders::default(),
                channel: None,
                closing_connection: false,
                has_received_last_segment: false,
                ack_to_fin: false,
                data_for_sending_ready: false,
            }),
            busy_read: BusyFlag::default(),
            busy_write: BusyFlag::default(),
            abort: AbortSignal::new(),
        }
    }

    pub fn key(&self) -> FlowKey {
        self.key
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Time since the session was created.
    pub fn age(&self) -> std::time::Duration {
        self.created.elapsed()
    }

    // -- Lifecycle --

    pub fn state(&self) -> SessionState {
        if self.abort.is_aborted() {
            return SessionState::Terminated;
        }
        self.inner.lock().state
    }

    fn advance(&self, next: SessionState) {
        let mut inner = self.inner.lock();
        if inner.state.advance(next) {
            debug!("[{}] {}", self.key, next);
        }
    }

    pub fn mark_handshaking(&self) {
        self.advance(SessionState::Handshaking);
    }

    pub fn mark_established(&self) {
        self.advance(SessionState::Established);
    }

    pub fn is_connected(&self) -> bool {
        self.state() >= SessionState::Established
    }

    pub fn is_closing_connection(&self) -> bool {
        self.inner.lock().closing_connection
    }

    pub fn set_closing_connection(&self, value: bool) {
        self.inner.lock().closing_connection = value;
        if value {
            self.advance(SessionState::Closing);
        }
    }

    pub fn has_received_last_segment(&self) -> bool {
        self.inner.lock().has_received_last_segment
    }

    pub fn set_has_received_last_segment(&self, value: bool) {
        self.inner.lock().has_received_last_segment = value;
        if value {
            self.advance(SessionState::Closing);
        }
    }

    pub fn is_ack_to_fin(&self) -> bool {
        self.inner.lock().ack_to_fin
    }

    pub fn set_ack_to_fin(&self, value: bool) {
        self.inner.lock().ack_to_fin = value;
    }

    pub fn is_data_for_sending_ready(&self) -> bool {
        self.inner.lock().data_for_sending_ready
    }

    pub fn set_data_for_sending_ready(&self, value: bool) {
        self.inner.lock().data_for_sending_ready = value;
    }

    /// Terminal. Buffer operations become no-ops and the registry may reclaim the session once it is idle.
    pub fn abort(&self) {
        if !self.abort.is_aborted() {
            debug!("[{}] aborting", self.key);
        }
        self.abort.abort();
        let mut inner = self.inner.lock();
        inner.state.advance(SessionState::Terminated);
        inner.receiving.close();
        inner.sending.close();
    }

    pub fn is_aborting(&self) -> bool {
        self.abort.is_aborted()
    }

    /// A handle workers can poll without holding the session.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    // -- Busy guards --

    pub fn try_busy_read(&self) -> Option<BusyGuard<'_>> {
        self.busy_read.try_acquire()
    }

    pub fn try_busy_write(&self) -> Option<BusyGuard<'_>> {
        self.busy_write.try_acquire()
    }

    pub fn is_busy_read(&self) -> bool {
        self.busy_read.is_busy()
    }

    pub fn is_busy_write(&self) -> bool {
        self.busy_write.is_busy()
    }

    /// Neither direction is being serviced.
    pub fn is_idle(&self) -> bool {
        !self.is_busy_read() && !self.is_busy_write()
    }

    // -- Buffers --

    /// Append bytes from the destination. The buffer grows as needed; only a closed stream refuses bytes, and that
    /// is logged.
    pub fn add_received_data(&self, data: &[u8]) {
        if self.abort.is_aborted() {
            return;
        }
        if let Err(e) = self.inner.lock().receiving.write_bytes(data) {
            error!("[{}] dropped {} received bytes: {}", self.key, data.len(), e);
        }
    }

    /// Remove up to `max_size` bytes from the front of the receive buffer, leaving the rest.
    pub fn take_received_data(&self, max_size: usize) -> Vec<u8> {
        if self.abort.is_aborted() {
            return Vec::new();
        }
        self.inner.lock().receiving.read_bytes(max_size)
    }

    pub fn has_received_data(&self) -> bool {
        !self.inner.lock().receiving.is_empty()
    }

    /// Enough is buffered for the client that the destination should not be read until it drains.
    pub fn is_receive_buffer_full(&self) -> bool {
        let inner = self.inner.lock();
        inner.receiving.bytes_available() >= inner.receive_high_water
    }

    /// Cut the next segment for the client and reserve its sequence numbers in one step. `None` when nothing is
    /// buffered, the client's window is full or the session is aborting.
    pub fn take_segment(&self, default_segment_size: usize) -> Option<OutboundSegment> {
        if self.abort.is_aborted() {
            return None;
        }
        let mut inner = self.inner.lock();
        if inner.control.is_client_window_full() {
            return None;
        }

        let max = inner.control.segment_size(default_segment_size);
        let payload = inner.receiving.read_bytes(max);
        if payload.is_empty() {
            return None;
        }

        let push = inner.has_received_last_segment;
        let control = &mut inner.control;
        let seq = control.send_next;
        control.send_next = seq + payload.len() as u32;
        control.record_sent_to_client(payload.len());
        Some(OutboundSegment {
            seq,
            ack: control.rec_sequence,
            timestamps: (control.timestamp_sender, control.timestamp_reply_to),
            push,
            payload,
        })
    }

    /// Append bytes from the client for the destination. False if they could not be buffered.
    pub fn queue_sending_data(&self, data: &[u8]) -> bool {
        if self.abort.is_aborted() {
            return false;
        }
        match self.inner.lock().sending.write_bytes(data) {
            Ok(_) => true,
            Err(e) => {
                error!("[{}] failed to queue {} bytes: {}", self.key, data.len(), e);
                false
            }
        }
    }

    /// Drain the whole send buffer.
    pub fn take_sending_data(&self) -> Vec<u8> {
        if self.abort.is_aborted() {
            return Vec::new();
        }
        self.inner.lock().sending.read_all()
    }

    pub fn has_data_to_send(&self) -> bool {
        !self.inner.lock().sending.is_empty()
    }

    pub fn sending_data_size(&self) -> usize {
        self.inner.lock().sending.bytes_available()
    }

    // -- Flow control --

    /// Lock the session and borrow its flow control fields.
    pub fn control(&self) -> MappedMutexGuard<'_, FlowControl> {
        MutexGuard::map(self.inner.lock(), |inner| &mut inner.control)
    }

    pub fn set_send_window_size_and_scale(&self, size: u32, scale: u32) {
        self.control().set_send_window_size_and_scale(size, scale);
    }

    pub fn is_client_window_full(&self) -> bool {
        self.control().is_client_window_full()
    }

    /// Apply an ACK from the client. The first accepted ACK completes the handshake.
    pub fn accept_ack(&self, tcp: &TcpHeader, now_ms: u32) -> bool {
        let accepted = self.control().accept_ack(tcp, now_ms);
        if accepted && self.state() == SessionState::Handshaking {
            self.mark_established();
        }
        accepted
    }

    // -- Headers and channel --

    pub fn set_last_tcp_headers(&self, ip: Ipv4Header, tcp: TcpHeader) {
        let mut inner = self.inner.lock();
        inner.last.ip = Some(ip);
        inner.last.tcp = Some(tcp);
    }

    pub fn set_last_udp_headers(&self, ip: Ipv4Header, udp: UdpHeader) {
        let mut inner = self.inner.lock();
        inner.last.ip = Some(ip);
        inner.last.udp = Some(udp);
    }

    pub fn last_tcp_headers(&self) -> Option<(Ipv4Header, TcpHeader)> {
        let inner = self.inner.lock();
        Some((inner.last.ip.clone()?, inner.last.tcp.clone()?))
    }

    pub fn last_udp_headers(&self) -> Option<(Ipv4Header, UdpHeader)> {
        let inner = self.inner.lock();
        Some((inner.last.ip.clone()?, inner.last.udp.clone()?))
    }

    pub fn channel(&self) -> Option<ChannelToken> {
        self.inner.lock().channel
    }

    pub fn set_channel(&self, token: ChannelToken) {
        self.inner.lock().channel = Some(token);
    }
}

// -- Unit tests --
