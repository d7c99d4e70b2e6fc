use std::fmt;

/// Lifecycle of a session. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    New,         // Created, no handshake seen
    Handshaking, // SYN seen, SYN-ACK sent, waiting for the client's ACK
    Established, // Handshake complete
    Closing,     // Half-close in progress or the last segment has been received
    Terminated,  // Aborted, eligible for removal
}

impl SessionState {
    /// Move to `next` if it is later than `self`.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::New => "NEW",
            SessionState::Handshaking => "HANDSHAKING",
            SessionState::Established => "ESTABLISHED",
            SessionState::Closing => "CLOSING",
            SessionState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}
