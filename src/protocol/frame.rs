//! Inbound-data announcement framing.
//!
//! The modem reports data received from a remote peer as
//!
//! ```text
//! +IPD,<connId>,<length>:<payload>
//! ```
//!
//! where `connId` and `length` are ASCII decimal and exactly `length` payload
//! bytes follow the colon. The payload itself is streamed straight into the
//! station buffer, so a completed frame only carries its header values.

use std::fmt;

/// Literal that opens every inbound-data announcement.
pub const IPD_MARKER: &[u8] = b"+IPD,";

/// Separates the connection id from the payload length.
pub const ID_SEPARATOR: u8 = b',';

/// Ends the length field; payload bytes follow.
pub const LENGTH_TERMINATOR: u8 = b':';

/// Logical client connection as numbered by the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u8);

impl ConnectionId {
    #[inline]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl From<u8> for ConnectionId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully received frame. The payload occupies `[0, length)` of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundFrame {
    pub connection_id: ConnectionId,
    pub length: usize,
}

impl InboundFrame {
    #[inline]
    pub fn new(connection_id: ConnectionId, length: usize) -> Self {
        Self {
            connection_id,
            length,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Encode an announcement, as the modem would emit it.
///
/// The transport never sends these; this exists for simulations and tests
/// that play the modem side.
pub fn build_announcement(connection_id: ConnectionId, payload: &[u8]) -> Vec<u8> {
    let mut out = format!("+IPD,{},{}:", connection_id, payload.len()).into_bytes();
    out.extend_from_slice(payload);
    out
}
