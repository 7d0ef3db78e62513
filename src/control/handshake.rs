//! Modem bring-up sequence.
//!
//! Runs once before the service loop. Each step sends one AT command and
//! waits for its acknowledgement marker; the first step that times out
//! aborts the whole sequence. There is no retry.
//!
//! # Example
//!
//! ```ignore
//! use commandstation_wifi::control::ModemHandshake;
//!
//! let handshake = ModemHandshake::new(&config);
//! handshake.run(&mut modem, &clock)?;
//! ```

use std::time::Duration;

use super::command::AtCommand;
use super::matcher::PatternMatcher;
use crate::clock::Clock;
use crate::config::WifiConfig;
use crate::error::{Result, WifiError};
use crate::transport::Modem;

/// Printed by the modem once it has rebooted.
pub const READY_MARKER: &str = "\r\nready\r\n";

/// Acknowledgement for a successful command.
pub const OK_MARKER: &str = "\r\nOK\r\n";

/// One command and the marker that acknowledges it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeStep<'a> {
    pub name: &'static str,
    pub command: AtCommand<'a>,
    pub marker: &'static str,
    pub timeout: Duration,
}

impl<'a> HandshakeStep<'a> {
    fn new(name: &'static str, command: AtCommand<'a>, marker: &'static str, timeout_ms: u64) -> Self {
        Self {
            name,
            command,
            marker,
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

/// Ordered bring-up steps built from a [`WifiConfig`].
#[derive(Debug, Clone)]
pub struct ModemHandshake<'a> {
    settle: Duration,
    steps: Vec<HandshakeStep<'a>>,
}

impl<'a> ModemHandshake<'a> {
    pub fn new(config: &'a WifiConfig) -> Self {
        let t = &config.timeouts;
        let mut steps = Vec::with_capacity(8);

        steps.push(HandshakeStep::new("reset", AtCommand::Reset, READY_MARKER, t.reset_ms));
        steps.push(HandshakeStep::new(
            "station mode",
            AtCommand::StationMode,
            OK_MARKER,
            t.station_mode_ms,
        ));
        if config.set_hostname {
            steps.push(HandshakeStep::new(
                "hostname",
                AtCommand::SetHostname {
                    hostname: &config.hostname,
                },
                OK_MARKER,
                t.optional_step_ms,
            ));
        }
        steps.push(HandshakeStep::new(
            "join network",
            AtCommand::JoinNetwork {
                ssid: &config.ssid,
                password: &config.password,
            },
            OK_MARKER,
            t.join_ms,
        ));
        steps.push(HandshakeStep::new(
            "query address",
            AtCommand::QueryAddress,
            OK_MARKER,
            t.address_ms,
        ));
        steps.push(HandshakeStep::new(
            "multiplex",
            AtCommand::EnableMultiplex,
            OK_MARKER,
            t.multiplex_ms,
        ));
        steps.push(HandshakeStep::new(
            "server",
            AtCommand::StartServer { port: config.port },
            OK_MARKER,
            t.server_ms,
        ));
        if config.advertise_mdns {
            steps.push(HandshakeStep::new(
                "mdns",
                AtCommand::AdvertiseMdns {
                    hostname: &config.hostname,
                    servername: &config.servername,
                    port: config.port,
                },
                OK_MARKER,
                t.optional_step_ms,
            ));
        }

        Self {
            settle: t.settle(),
            steps,
        }
    }

    pub fn steps(&self) -> &[HandshakeStep<'a>] {
        &self.steps
    }

    /// Run every step in order.
    ///
    /// # Errors
    ///
    /// [`WifiError::HandshakeFailed`] naming the first step whose marker did
    /// not arrive in time, or the modem's write error.
    pub fn run<M, C>(&self, modem: &mut M, clock: &C) -> Result<()>
    where
        M: Modem + ?Sized,
        C: Clock + ?Sized,
    {
        tracing::info!("Wifi setup in progress");
        if !self.settle.is_zero() {
            clock.sleep(self.settle);
        }

        for step in &self.steps {
            modem.send_command(&step.command)?;

            let mut matcher = PatternMatcher::new(step.marker);
            if matcher.scan(modem, clock, step.timeout).is_none() {
                tracing::warn!("Wifi setup FAILED at {}", step.name);
                return Err(WifiError::HandshakeFailed {
                    step: step.name,
                    marker: step.marker,
                    timeout: step.timeout,
                });
            }
        }

        tracing::info!("Wifi setup OK");
        Ok(())
    }
}
