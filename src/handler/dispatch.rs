//! Routing of completed frames to their handler.
//!
//! A request is classified by a literal prefix table: HTTP methods go to the
//! HTTP handler (and the connection is closed after the reply), a leading
//! `<` goes to the text command handler, and everything else goes to the
//! control session for that connection.

use super::registry::{HandlerSet, RequestHandler};
use super::RequestContext;
use crate::diag::Escaped;
use crate::protocol::{FixedCursorBuffer, InboundFrame, TERMINATOR};

/// Request prefixes routed to the HTTP handler.
pub const HTTP_METHODS: &[&[u8]] = &[b"GET ", b"POST ", b"PUT ", b"PATCH ", b"DELETE "];

/// First byte of a text command.
pub const COMMAND_START: u8 = b'<';

/// Which handler a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Http,
    Command,
    Control,
}

impl RequestKind {
    /// Whether the connection is closed once the reply has been sent.
    #[inline]
    pub fn closes_connection(self) -> bool {
        matches!(self, RequestKind::Http)
    }
}

/// Classify a request payload.
pub fn classify(request: &[u8]) -> RequestKind {
    if HTTP_METHODS.iter().any(|method| request.starts_with(method)) {
        RequestKind::Http
    } else if request.first() == Some(&COMMAND_START) {
        RequestKind::Command
    } else {
        RequestKind::Control
    }
}

/// What the transport does after a handler returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing to send. `close` asks for the connection to be closed.
    NoReply { close: bool },
    /// `length` reply bytes are waiting at the start of the buffer.
    Reply { length: usize, close: bool },
}

/// Hand a completed frame to its handler.
///
/// The frame payload must occupy `[0, frame.length)` of `buffer` with room
/// for a terminator, as left by the frame receiver. On return the buffer
/// holds the terminated reply, if any.
pub fn dispatch(handlers: &mut HandlerSet, buffer: &mut FixedCursorBuffer, frame: InboundFrame) -> Dispatch {
    if buffer.write(TERMINATOR).is_err() {
        // The receiver never completes a frame without terminator room.
        tracing::error!("Frame on {} fills the buffer, ignored", frame.connection_id);
        buffer.reset_for_write();
        return Dispatch::NoReply { close: false };
    }
    tracing::debug!(
        "WifiRead {}: {}",
        frame.connection_id,
        Escaped(buffer.read_all())
    );

    buffer.reposition(0, 0);
    let kind = classify(buffer.stored(frame.length));
    let close = kind.closes_connection();

    let mut ctx = RequestContext::new(buffer, frame.connection_id, kind, frame.length);
    match kind {
        RequestKind::Http => handlers.http.handle(&mut ctx),
        RequestKind::Command => handlers.command.handle(&mut ctx),
        RequestKind::Control => match handlers.control.get_or_create(frame.connection_id) {
            Some(session) => session.handle(&mut ctx),
            None => tracing::debug!("No control handler for {}", frame.connection_id),
        },
    }
    let overflowed = ctx.overflowed();

    if overflowed {
        tracing::warn!(
            "Reply to {} exceeds {} bytes, discarded",
            frame.connection_id,
            buffer.capacity() - 1
        );
        buffer.reset_for_write();
        return Dispatch::NoReply { close };
    }

    if buffer.available() == 0 {
        return Dispatch::NoReply { close };
    }

    if buffer.write(TERMINATOR).is_err() {
        // Reply room always leaves one byte spare; treat a violation as overflow.
        buffer.reset_for_write();
        return Dispatch::NoReply { close };
    }
    Dispatch::Reply {
        length: buffer.available() - 1,
        close,
    }
}
