//! Control plane - AT commands and the modem bring-up handshake.
//!
//! Before any client traffic is served the modem is reset and configured
//! with a fixed sequence of AT commands. Each command is acknowledged by a
//! literal marker in the modem's output.
//!
//! # Workflow
//!
//! 1. Wait for the modem to power up
//! 2. `AT+RST`, wait for `ready`
//! 3. Station mode, join the network, query the address
//! 4. Enable multiplexing and start the TCP server
//! 5. Service loop begins; the handshake is never repeated implicitly
//!
//! # Example
//!
//! ```ignore
//! use commandstation_wifi::control::{AtCommand, PatternMatcher, OK_MARKER};
//!
//! modem.send_command(&AtCommand::EnableMultiplex)?;
//! let found = PatternMatcher::new(OK_MARKER).scan(&mut modem, &clock, timeout);
//! ```

mod command;
mod handshake;
mod matcher;

pub use command::{AtCommand, CommandLine, LINE_CAPACITY};
pub use handshake::{HandshakeStep, ModemHandshake, OK_MARKER, READY_MARKER};
pub use matcher::{PatternMatcher, POLL_INTERVAL};
