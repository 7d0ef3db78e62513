//! Handler module - request classification and dispatch.
//!
//! Provides:
//! - [`RequestHandler`] - the handler capability, one per request kind
//! - [`HandlerSet`] - HTTP, command and per-connection control handlers
//! - [`RequestContext`] - request view and in-place reply writer
//! - [`dispatch`] - routes a completed frame and reports the reply
//!
//! # Example
//!
//! ```ignore
//! use std::fmt::Write;
//! use commandstation_wifi::handler::{from_fn, HandlerSet};
//!
//! let mut handlers = HandlerSet::new();
//!
//! // Text commands must answer before returning
//! handlers.set_command(from_fn(|ctx| {
//!     if ctx.request() == b"<s>" {
//!         let _ = write!(ctx, "<p1>");
//!     }
//! }));
//!
//! // HTTP connections are closed after the reply
//! handlers.set_http(from_fn(|ctx| {
//!     let _ = ctx.reply(b"HTTP/1.1 404 Not Found\r\n\r\n");
//! }));
//! ```

mod context;
mod dispatch;
mod registry;

pub use context::RequestContext;
pub use dispatch::{classify, dispatch, Dispatch, RequestKind, COMMAND_START, HTTP_METHODS};
pub use registry::{
    from_fn, ControlSessions, FnHandler, HandlerSet, Housekeeping, Liveness, NoReply,
    RequestHandler, SessionFactory,
};
