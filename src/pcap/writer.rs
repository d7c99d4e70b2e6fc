use crate::config::CaptureConfig;
use crate::pcap::errors::CaptureError;
use crate::pcap::ethernet::{self, ETHERNET_HEADER_LEN};
use crate::pcap::file_header::{PcapFileHeader, FILE_HEADER_LEN};
use crate::pcap::record_header::{PcapRecordHeader, RECORD_HEADER_LEN};
use log::{debug, info};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Largest IP packet accepted into a capture.
pub const MAX_PACKET_SIZE: usize = 65356;

/// Bytes after which a writer refuses further records.
pub const DEFAULT_SIZE_LIMIT: u64 = 100_000_000_000;

/// Sink for captured IP packets.
pub trait CaptureFileWriter: Send {
    /// Append one record. `Ok(false)` if the writer is closed or full; previously written records are untouched
    /// either way. A timestamp of 0 means "now, relative to when the writer was opened".
    fn add_packet(&mut self, packet: &[u8], timestamp_nanos: u64) -> Result<bool, CaptureError>;

    /// Flush and finalize. Records accepted before this call are durable when it returns.
    fn close(&mut self) -> Result<(), CaptureError>;
}

/// Writes IP packets as Ethernet-framed pcap records.
#[derive(Debug)]
pub struct PcapFileWriter<W: Write> {
    out: W,
    opened: bool,
    total_bytes: u64,
    size_limit: u64,
    started: Instant,
}

impl<W: Write> PcapFileWriter<W> {
    /// Start a new capture on `out`, writing the global header.
    pub fn new(out: W) -> Result<Self, CaptureError> {
        Self::start(out, true)
    }

    fn start(mut out: W, write_header: bool) -> Result<Self, CaptureError> {
        if write_header {
            out.write_all(&PcapFileHeader::default().to_bytes())?;
        }
        Ok(PcapFileWriter {
            out,
            opened: true,
            total_bytes: FILE_HEADER_LEN as u64,
            size_limit: DEFAULT_SIZE_LIMIT,
            started: Instant::now(),
        })
    }

    pub fn with_limit(mut self, size_limit: u64) -> Self {
        self.size_limit = size_limit;
        self
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    /// Bytes accounted so far, starting with the global header.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

impl PcapFileWriter<BufWriter<File>> {
    /// Create or truncate the capture file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        Self::open(path, false)
    }

    /// Open the capture file at `path`. The global header is written for a new file or when not appending.
    pub fn open(path: impl AsRef<Path>, append: bool) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let write_header = !append || !path.exists();

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;

        info!("Capturing to {} (append: {})", path.display(), append);
        Self::start(BufWriter::new(file), write_header)
    }
}

impl<W: Write + Send> CaptureFileWriter for PcapFileWriter<W> {
    fn add_packet(&mut self, packet: &[u8], timestamp_nanos: u64) -> Result<bool, CaptureError> {
        if !self.opened || self.total_bytes > self.size_limit {
            return Ok(false);
        }
        if packet.len() > MAX_PACKET_SIZE {
            return Err(CaptureError::PacketTooLarge(packet.len()));
        }

        let timestamp = if timestamp_nanos == 0 {
            self.started.elapsed().as_nanos() as u64
        } else {
            timestamp_nanos
        };
        let frame_len = packet.len() + ETHERNET_HEADER_LEN;
        let record = PcapRecordHeader::from_nanos(timestamp, frame_len as u32);

        self.out.write_all(&record.to_bytes())?;
        self.out.write_all(&ethernet::stub_header())?;
        self.out.write_all(packet)?;

        self.total_bytes += (RECORD_HEADER_LEN + frame_len) as u64;
        Ok(true)
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        if self.opened {
            self.opened = false;
            self.out.flush()?;
            debug!("Capture closed after {} bytes", self.total_bytes);
        }
        Ok(())
    }
}

/// A capture writer shared between threads. Records are appended one at a time, in call order.
#[derive(Clone)]
pub struct SharedCaptureWriter {
    inner: Arc<Mutex<Box<dyn CaptureFileWriter>>>,
}

impl SharedCaptureWriter {
    pub fn new(writer: impl CaptureFileWriter + 'static) -> Self {
        SharedCaptureWriter {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Open the configured capture file, or `None` when capturing is disabled.
    pub fn from_config(config: &CaptureConfig) -> Result<Option<Self>, CaptureError> {
        if !config.enabled {
            return Ok(None);
        }
        let writer = PcapFileWriter::open(&config.path, config.append)?.with_limit(config.size_limit);
        Ok(Some(Self::new(writer)))
    }

    pub fn add_packet(&self, packet: &[u8], timestamp_nanos: u64) -> Result<bool, CaptureError> {
        self.inner.lock().add_packet(packet, timestamp_nanos)
    }

    pub fn close(&self) -> Result<(), CaptureError> {
        self.inner.lock().close()
    }
}

impl std::fmt::Debug for SharedCaptureWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCaptureWriter").finish_non_exhaustive()
    }
}
