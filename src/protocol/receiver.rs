//! Incremental receiver for `+IPD` frames.
//!
//! Bytes are fed one at a time as the serial link delivers them, so a frame
//! may be split across any number of service ticks. The receiver never
//! blocks and never looks ahead:
//!
//! - `Scanning`: looking for the `+` that opens an announcement
//! - `Marker`: matching the rest of `+IPD,`
//! - `ConnectionId`: decimal digits up to `,`
//! - `Length`: decimal digits up to `:`
//! - `Payload`: streaming `length` bytes into the station buffer
//! - `Discarding`: swallowing a frame too large for the buffer
//! - `Complete`: holding a frame until the station releases it
//!
//! A byte that breaks the marker or a header field is not lost: it is
//! re-examined as a potential start of a new announcement.
//!
//! # Example
//!
//! ```
//! use commandstation_wifi::protocol::{Feed, FixedCursorBuffer, FrameReceiver};
//!
//! let mut buffer = FixedCursorBuffer::new(64);
//! let mut receiver = FrameReceiver::new();
//!
//! let (_, feed) = receiver.push(b"noise+IPD,2,3:<s>", &mut buffer);
//! match feed {
//!     Feed::Complete(frame) => {
//!         assert_eq!(frame.connection_id.get(), 2);
//!         assert_eq!(buffer.readable(), b"<s>");
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

use super::buffer::FixedCursorBuffer;
use super::frame::{ConnectionId, InboundFrame, ID_SEPARATOR, IPD_MARKER, LENGTH_TERMINATOR};

/// Parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Scanning,
    /// `matched` bytes of [`IPD_MARKER`] seen so far (1..=4).
    Marker { matched: usize },
    ConnectionId,
    Length,
    Payload { remaining: usize },
    Discarding { remaining: usize },
    Complete(InboundFrame),
}

/// Outcome of feeding one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Byte consumed, frame not finished yet.
    Pending,
    /// Byte consumed and it finished a frame. The payload is in the buffer.
    Complete(InboundFrame),
    /// Byte consumed and it finished a frame that was too large to keep.
    Dropped {
        connection_id: ConnectionId,
        length: usize,
    },
    /// A completed frame is still held; the byte was not consumed.
    Busy,
}

/// Non-blocking `+IPD` state machine.
#[derive(Debug)]
pub struct FrameReceiver {
    state: State,
    connection_id: u8,
    length: usize,
    digits: usize,
}

impl FrameReceiver {
    pub fn new() -> Self {
        Self {
            state: State::Scanning,
            connection_id: 0,
            length: 0,
            digits: 0,
        }
    }

    /// Feed a single byte.
    ///
    /// Payload bytes are written into `buffer`, which is reset for write when
    /// the header completes.
    pub fn feed(&mut self, byte: u8, buffer: &mut FixedCursorBuffer) -> Feed {
        match self.state {
            State::Scanning => self.scan(byte),

            State::Marker { matched } => {
                if byte != IPD_MARKER[matched] {
                    return self.scan(byte);
                }
                if matched + 1 == IPD_MARKER.len() {
                    self.connection_id = 0;
                    self.length = 0;
                    self.digits = 0;
                    self.state = State::ConnectionId;
                } else {
                    self.state = State::Marker {
                        matched: matched + 1,
                    };
                }
                Feed::Pending
            }

            State::ConnectionId => match byte {
                ID_SEPARATOR if self.digits > 0 => {
                    self.digits = 0;
                    self.state = State::Length;
                    Feed::Pending
                }
                b'0'..=b'9' => {
                    match self
                        .connection_id
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(byte - b'0'))
                    {
                        Some(id) => {
                            self.connection_id = id;
                            self.digits += 1;
                            Feed::Pending
                        }
                        None => self.scan(byte),
                    }
                }
                _ => self.scan(byte),
            },

            State::Length => match byte {
                LENGTH_TERMINATOR if self.digits > 0 => self.finish_header(buffer),
                b'0'..=b'9' => {
                    match self
                        .length
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(usize::from(byte - b'0')))
                    {
                        Some(length) => {
                            self.length = length;
                            self.digits += 1;
                            Feed::Pending
                        }
                        None => self.scan(byte),
                    }
                }
                _ => self.scan(byte),
            },

            State::Payload { remaining } => {
                if buffer.write(byte).is_err() {
                    tracing::warn!(
                        "Buffer exhausted mid-frame on connection {}, dropping",
                        self.connection_id
                    );
                    return self.discard(remaining);
                }
                let remaining = remaining - 1;
                if remaining == 0 {
                    let frame = self.frame();
                    self.state = State::Complete(frame);
                    Feed::Complete(frame)
                } else {
                    self.state = State::Payload { remaining };
                    Feed::Pending
                }
            }

            State::Discarding { remaining } => self.discard(remaining),

            State::Complete(_) => Feed::Busy,
        }
    }

    /// Feed bytes until a frame completes or is dropped, or `data` runs out.
    ///
    /// Returns how many bytes were consumed and the last outcome. Bytes after
    /// a completed frame are left for the caller.
    pub fn push(&mut self, data: &[u8], buffer: &mut FixedCursorBuffer) -> (usize, Feed) {
        for (i, &byte) in data.iter().enumerate() {
            match self.feed(byte, buffer) {
                Feed::Pending => {}
                Feed::Busy => return (i, Feed::Busy),
                done => return (i + 1, done),
            }
        }
        (data.len(), Feed::Pending)
    }

    /// Let go of a completed frame and resume scanning.
    pub fn release(&mut self) {
        if let State::Complete(_) = self.state {
            self.state = State::Scanning;
        }
    }

    /// Abandon any partial frame.
    pub fn reset(&mut self) {
        self.state = State::Scanning;
    }

    /// The frame currently held, if any.
    pub fn completed(&self) -> Option<InboundFrame> {
        match self.state {
            State::Complete(frame) => Some(frame),
            _ => None,
        }
    }

    /// `true` while no announcement is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == State::Scanning
    }

    fn scan(&mut self, byte: u8) -> Feed {
        self.state = if byte == IPD_MARKER[0] {
            State::Marker { matched: 1 }
        } else {
            State::Scanning
        };
        Feed::Pending
    }

    fn finish_header(&mut self, buffer: &mut FixedCursorBuffer) -> Feed {
        if self.length == 0 {
            buffer.reset_for_write();
            let frame = self.frame();
            self.state = State::Complete(frame);
            return Feed::Complete(frame);
        }

        // Payload plus terminator must fit.
        if self.length >= buffer.capacity() {
            tracing::warn!(
                "Frame on connection {} declares {} bytes, buffer holds {}; discarding",
                self.connection_id,
                self.length,
                buffer.capacity()
            );
            self.state = State::Discarding {
                remaining: self.length,
            };
            return Feed::Pending;
        }

        buffer.reset_for_write();
        self.state = State::Payload {
            remaining: self.length,
        };
        Feed::Pending
    }

    fn discard(&mut self, remaining: usize) -> Feed {
        let remaining = remaining - 1;
        if remaining == 0 {
            self.state = State::Scanning;
            Feed::Dropped {
                connection_id: ConnectionId::new(self.connection_id),
                length: self.length,
            }
        } else {
            self.state = State::Discarding { remaining };
            Feed::Pending
        }
    }

    fn frame(&self) -> InboundFrame {
        InboundFrame::new(ConnectionId::new(self.connection_id), self.length)
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::Scanning => "Scanning",
            State::Marker { .. } => "Marker",
            State::ConnectionId => "ConnectionId",
            State::Length => "Length",
            State::Payload { .. } => "Payload",
            State::Discarding { .. } => "Discarding",
            State::Complete(_) => "Complete",
        }
    }
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}
