//! # commandstation-wifi
//!
//! Network transport for a model-railway command station whose WiFi comes
//! from a serial-attached modem driven by AT commands.
//!
//! The modem multiplexes TCP clients by a small connection id and reports
//! their data as `+IPD,<id>,<len>:<payload>`. This crate turns that byte
//! stream into a non-blocking request/response server.
//!
//! ## Architecture
//!
//! - **Control** ([`control`]): one-shot bring-up handshake with marker
//!   matching and per-step timeouts
//! - **Protocol** ([`protocol`]): byte-at-a-time `+IPD` receiver writing into
//!   a single fixed buffer that is reused for the reply
//! - **Handlers** ([`handler`]): HTTP, text command and per-connection
//!   control handlers, selected by request prefix
//! - **Transmit** ([`transmit`]): `AT+CIPSEND` prompt and `SEND OK`
//!   confirmation, each bounded by a deadline
//! - **Transport** ([`transport`]): the [`Modem`] byte link, with a tokio
//!   serial driver and an in-memory modem for tests
//!
//! ## Example
//!
//! ```ignore
//! use commandstation_wifi::{from_fn, Station, WifiConfig};
//!
//! #[tokio::main]
//! async fn main() -> commandstation_wifi::Result<()> {
//!     let port = tokio::net::TcpStream::connect("127.0.0.1:4000").await?;
//!
//!     let station = Station::builder(WifiConfig::new("Layout", "s3cret"))
//!         .command(from_fn(|ctx| {
//!             if ctx.request() == b"<s>" {
//!                 let _ = ctx.reply(b"<p1>");
//!             }
//!         }))
//!         .serve(port)
//!         .await?;
//!
//!     station.wait().await
//! }
//! ```

pub mod clock;
pub mod config;
pub mod control;
pub mod diag;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transmit;
pub mod transport;
pub mod writer;

mod station;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Timeouts, WifiConfig};
pub use error::{Result, WifiError};
pub use handler::{from_fn, Liveness, RequestContext, RequestHandler, RequestKind};
pub use protocol::ConnectionId;
pub use station::{Station, StationBuilder, StationHandle, TransportState};
pub use transport::{MemoryModem, Modem};
