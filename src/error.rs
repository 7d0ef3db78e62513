//! Error types for the WiFi transport.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all transport operations.
#[derive(Debug, Error)]
pub enum WifiError {
    /// I/O error on the serial link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration parsed but is unusable.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A handshake step did not see its marker in time.
    #[error("Handshake failed at {step}: no {marker:?} within {timeout:?}")]
    HandshakeFailed {
        step: &'static str,
        marker: &'static str,
        timeout: Duration,
    },

    /// A formatted AT command does not fit the command line buffer.
    #[error("AT command exceeds {capacity} bytes")]
    CommandTooLong { capacity: usize },

    /// Write past the end of a fixed buffer.
    #[error("Buffer full (capacity {capacity})")]
    BufferFull { capacity: usize },

    /// Operation requires a completed handshake.
    #[error("Modem not connected")]
    NotConnected,

    /// The serial link went away.
    #[error("Modem link closed")]
    LinkClosed,

    /// The blocking service worker panicked or was cancelled.
    #[error("Service task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias using WifiError.
pub type Result<T> = std::result::Result<T, WifiError>;
