//! TCP option kinds and their opportunistic decoding.
//!
//! The raw option bytes of a [`crate::tcp::tcp_header::TcpHeader`] are the single source of truth. The values here
//! are derived from them on demand, so the decoded view can never disagree with what goes on the wire.

pub const END_OF_OPTIONS: u8 = 0;
pub const NO_OPERATION: u8 = 1;
pub const MAX_SEGMENT_SIZE: u8 = 2;
pub const WINDOW_SCALE: u8 = 3;
pub const SACK_PERMITTED: u8 = 4;
pub const TIMESTAMP: u8 = 8;

/// Largest shift count a window scale option may carry (RFC 7323).
pub const MAX_WINDOW_SHIFT: u8 = 14;

/// Values decoded from the option bytes that the session cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpOptions {
    pub max_segment_size: Option<u16>,
    pub window_scale: Option<u8>, // Shift count
    pub sack_permitted: bool,
    pub timestamp: Option<(u32, u32)>, // (sender, reply to)
}

impl TcpOptions {
    /// Decode the options present in `options`. Unknown kinds are skipped and a malformed length ends decoding.
    pub fn decode(options: &[u8]) -> Self {
        let mut decoded = TcpOptions::default();
        for (kind, value) in OptionIter::new(options) {
            match (kind, value.len()) {
                (MAX_SEGMENT_SIZE, 2) => {
                    decoded.max_segment_size = Some(u16::from_be_bytes([value[0], value[1]]));
                }
                (WINDOW_SCALE, 1) => decoded.window_scale = Some(value[0]),
                (SACK_PERMITTED, 0) => decoded.sack_permitted = true,
                (TIMESTAMP, 8) => {
                    let sender = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
                    let reply_to = u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
                    decoded.timestamp = Some((sender, reply_to));
                }
                _ => {}
            }
        }
        decoded
    }

    /// Window scale as a multiplication factor (`2^shift`), or 1 when the option is absent.
    pub fn window_scale_factor(&self) -> u32 {
        self.window_scale.map_or(1, |shift| 1u32 << shift.min(MAX_WINDOW_SHIFT))
    }
}

/// Overwrite the values of the first timestamp option in place. Returns false if there is none.
pub fn rewrite_timestamp(options: &mut [u8], sender: u32, reply_to: u32) -> bool {
    let mut i = 0;
    while i < options.len() {
        match options[i] {
            END_OF_OPTIONS => return false,
            NO_OPERATION => i += 1,
            kind => {
                let Some(&len) = options.get(i + 1) else {
                    return false;
                };
                let len = len as usize;
                if len < 2 || i + len > options.len() {
                    return false;
                }
                if kind == TIMESTAMP && len == 10 {
                    options[i + 2..i + 6].copy_from_slice(&sender.to_be_bytes());
                    options[i + 6..i + 10].copy_from_slice(&reply_to.to_be_bytes());
                    return true;
                }
                i += len;
            }
        }
    }
    false
}

/// Walks `(kind, value)` pairs of a TCP option list.
struct OptionIter<'a> {
    options: &'a [u8],
    pos: usize,
}

impl<'a> OptionIter<'a> {
    fn new(options: &'a [u8]) -> Self {
        OptionIter { options, pos: 0 }
    }
}

impl<'a> Iterator for OptionIter<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let kind = *self.options.get(self.pos)?;
            match kind {
                END_OF_OPTIONS => return None,
                NO_OPERATION => self.pos += 1,
                _ => {
                    let len = *self.options.get(self.pos + 1)? as usize;
                    if len < 2 || self.pos + len > self.options.len() {
                        return None;
                    }
                    let value = &self.options[self.pos + 2..self.pos + len];
                    self.pos += len;
                    return Some((kind, value));
                }
            }
        }
    }
}

// -- Unit tests --
