use std::collections::VecDeque;
use std::io;

/// A FIFO of bytes, bounded or not. Writes are all-or-nothing so concurrent writers never interleave partial
/// chunks.
#[derive(Debug)]
pub struct ByteStream {
    buffer: VecDeque<u8>,
    capacity: usize,
    closed: bool,
}

impl ByteStream {
    pub fn new(capacity: usize) -> Self {
        ByteStream {
            buffer: VecDeque::new(),
            capacity,
            closed: false,
        }
    }

    /// A stream that only refuses writes once closed.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Push all of `data` into the byte stream, or nothing if it does not fit
    pub fn write_bytes(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"));
        }
        if data.len() > self.remaining_capacity() {
            return Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("{} bytes do not fit, {} remaining", data.len(), self.remaining_capacity()),
            ));
        }
        self.buffer.extend(data);
        Ok(data.len())
    }

    /// Consume up to N bytes from the front of the byte stream
    pub fn read_bytes(&mut self, amount: usize) -> Vec<u8> {
        let to_read = amount.min(self.buffer.len());
        self.buffer.drain(0..to_read).collect()
    }

    /// Consume everything buffered
    pub fn read_all(&mut self) -> Vec<u8> {
        self.buffer.drain(..).collect()
    }

    /// Close the byte stream. Buffered bytes can still be read.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The remaining capacity in the underlying buffer
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    /// The number of bytes still available in the buffer (not consumed yet)
    pub fn bytes_available(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

// -- Unit tests --
