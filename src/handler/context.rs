//! Request context for handlers.
//!
//! A handler gets exclusive access to the shared buffer for the duration of
//! one call. The request is read first:
//! - `request` - the payload bytes
//! - `request_text` - the payload as UTF-8
//!
//! and the reply is then written over the same storage:
//! - `reply` - append raw bytes
//! - `write!` - formatted output through [`std::fmt::Write`]
//!
//! Once the first reply byte has been written the request is gone, and the
//! request accessors return empty.
//!
//! # Example
//!
//! ```ignore
//! fn status(ctx: &mut RequestContext<'_>) {
//!     let power_on = ctx.request() == b"<s>";
//!     let _ = write!(ctx, "<p{}>", u8::from(power_on));
//! }
//! ```

use std::fmt;

use super::dispatch::RequestKind;
use crate::error::{Result, WifiError};
use crate::protocol::{ConnectionId, FixedCursorBuffer};

/// Context passed to request handlers.
///
/// Borrows the station buffer, so a handler can never keep request or
/// reply storage past its return.
pub struct RequestContext<'a> {
    buffer: &'a mut FixedCursorBuffer,
    connection_id: ConnectionId,
    kind: RequestKind,
    request_len: usize,
    replying: bool,
    overflowed: bool,
}

impl<'a> RequestContext<'a> {
    /// Wrap a buffer holding a repositioned request of `request_len` bytes.
    pub(crate) fn new(
        buffer: &'a mut FixedCursorBuffer,
        connection_id: ConnectionId,
        kind: RequestKind,
        request_len: usize,
    ) -> Self {
        Self {
            buffer,
            connection_id,
            kind,
            request_len,
            replying: false,
            overflowed: false,
        }
    }

    /// Connection the request arrived on.
    #[inline]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    #[inline]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Whether the handler may answer after returning.
    ///
    /// Always `false` on this transport: a reply must be written before the
    /// handler returns or it is never sent.
    #[inline]
    pub fn deferred_reply_allowed(&self) -> bool {
        false
    }

    /// Request payload. Empty once a reply has been started.
    pub fn request(&self) -> &[u8] {
        if self.replying {
            return &[];
        }
        self.buffer.stored(self.request_len)
    }

    /// Request payload as text. Empty once a reply has been started.
    pub fn request_text(&self) -> std::result::Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(self.request())
    }

    /// Append reply bytes.
    ///
    /// One byte of the buffer is kept for the terminator the dispatcher
    /// appends.
    ///
    /// # Errors
    ///
    /// [`WifiError::BufferFull`] if the bytes do not fit. Nothing is written
    /// and the reply is marked as overflowed, so it will be discarded.
    pub fn reply(&mut self, data: &[u8]) -> Result<()> {
        self.replying = true;
        if data.len() >= self.buffer.remaining() {
            self.overflowed = true;
            return Err(WifiError::BufferFull {
                capacity: self.buffer.capacity(),
            });
        }
        self.buffer.write_all(data)
    }

    /// Reply bytes written so far.
    #[inline]
    pub fn reply_len(&self) -> usize {
        self.buffer.available()
    }

    /// Largest reply that still fits.
    #[inline]
    pub fn reply_room(&self) -> usize {
        self.buffer.remaining().saturating_sub(1)
    }

    #[inline]
    pub(crate) fn overflowed(&self) -> bool {
        self.overflowed
    }
}

impl fmt::Write for RequestContext<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.reply(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

impl fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("connection_id", &self.connection_id)
            .field("kind", &self.kind)
            .field("request_len", &self.request_len)
            .field("reply_len", &self.reply_len())
            .field("overflowed", &self.overflowed)
            .finish()
    }
}
