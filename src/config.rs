//! Startup configuration.
//!
//! Supplied once when the station is built. Every field has a default, so a
//! JSON file only needs the values it overrides:
//!
//! ```
//! use commandstation_wifi::WifiConfig;
//!
//! let config = WifiConfig::from_json(r#"{ "ssid": "Layout", "password": "s3cret" }"#).unwrap();
//! assert_eq!(config.port, 2560);
//! assert_eq!(config.timeouts.join_ms, 20_000);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::AtCommand;
use crate::error::{Result, WifiError};

/// Default TCP port the modem listens on.
pub const DEFAULT_PORT: u16 = 2560;

/// Default shared request/reply buffer size.
pub const DEFAULT_BUFFER_CAPACITY: usize = 250;

/// Default name used for `AT+CWHOSTNAME` and mDNS.
pub const DEFAULT_HOSTNAME: &str = "dccex";

/// WiFi transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    /// Network to join.
    pub ssid: String,
    /// Network passphrase.
    pub password: String,
    /// Station hostname, used by the optional hostname and mDNS steps.
    pub hostname: String,
    /// Service name advertised over mDNS.
    pub servername: String,
    /// Port for `AT+CIPSERVER`.
    pub port: u16,
    /// Size of the shared request/reply buffer, terminator included.
    pub buffer_capacity: usize,
    /// Send `AT+CWHOSTNAME` after selecting station mode.
    pub set_hostname: bool,
    /// Send `AT+MDNS` after starting the server.
    pub advertise_mdns: bool,
    /// Handshake and reply timeouts.
    pub timeouts: Timeouts,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            hostname: DEFAULT_HOSTNAME.to_string(),
            servername: DEFAULT_HOSTNAME.to_string(),
            port: DEFAULT_PORT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            set_hostname: false,
            advertise_mdns: false,
            timeouts: Timeouts::default(),
        }
    }
}

impl WifiConfig {
    /// Configuration for `ssid` with every other value defaulted.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the server port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the shared buffer size.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Check that the configuration can drive a handshake.
    ///
    /// # Errors
    ///
    /// - [`WifiError::InvalidConfig`] for an empty SSID, a zero port or a
    ///   buffer too small to hold one byte plus its terminator
    /// - [`WifiError::CommandTooLong`] if the join command would not fit a
    ///   command line
    pub fn validate(&self) -> Result<()> {
        if self.ssid.is_empty() {
            return Err(WifiError::InvalidConfig("ssid must not be empty".into()));
        }
        if self.port == 0 {
            return Err(WifiError::InvalidConfig("port must not be 0".into()));
        }
        if self.buffer_capacity < 2 {
            return Err(WifiError::InvalidConfig(format!(
                "buffer_capacity must be at least 2, got {}",
                self.buffer_capacity
            )));
        }

        AtCommand::JoinNetwork {
            ssid: &self.ssid,
            password: &self.password,
        }
        .encode()?;
        if self.advertise_mdns {
            AtCommand::AdvertiseMdns {
                hostname: &self.hostname,
                servername: &self.servername,
                port: self.port,
            }
            .encode()?;
        }
        Ok(())
    }
}

/// Timeouts, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Wait before the first command while the modem powers up.
    pub settle_ms: u64,
    /// `AT+RST` until `ready`.
    pub reset_ms: u64,
    /// `AT+CWMODE`.
    pub station_mode_ms: u64,
    /// `AT+CWJAP`.
    pub join_ms: u64,
    /// `AT+CIFSR`.
    pub address_ms: u64,
    /// `AT+CIPMUX`.
    pub multiplex_ms: u64,
    /// `AT+CIPSERVER`.
    pub server_ms: u64,
    /// `AT+CWHOSTNAME` and `AT+MDNS`.
    pub optional_step_ms: u64,
    /// Wait for the send prompt, and for the send confirmation when closing.
    pub reply_ms: u64,
    /// Idle sleep between service ticks in `run_until`.
    pub tick_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            settle_ms: 1_000,
            reset_ms: 5_000,
            station_mode_ms: 10_000,
            join_ms: 20_000,
            address_ms: 10_000,
            multiplex_ms: 10_000,
            server_ms: 10_000,
            optional_step_ms: 5_000,
            reply_ms: 2_000,
            tick_interval_ms: 1,
        }
    }
}

impl Timeouts {
    #[inline]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    #[inline]
    pub fn reply(&self) -> Duration {
        Duration::from_millis(self.reply_ms)
    }

    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
