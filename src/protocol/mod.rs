//! Protocol module - inbound framing and the shared request/reply buffer.
//!
//! This module implements the data path from the modem:
//! - `+IPD,<id>,<len>:` announcement framing
//! - Fixed-capacity buffer reused for request and reply
//! - Byte-at-a-time frame receiver

mod buffer;
mod frame;
mod receiver;

pub use buffer::{FixedCursorBuffer, TERMINATOR};
pub use frame::{
    build_announcement, ConnectionId, InboundFrame, ID_SEPARATOR, IPD_MARKER, LENGTH_TERMINATOR,
};
pub use receiver::{Feed, FrameReceiver};
