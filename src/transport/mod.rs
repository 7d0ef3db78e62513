//! Transport module - the byte link to the WiFi modem.
//!
//! Provides:
//! - [`Modem`] - non-blocking byte source and sink the station drives
//! - [`SerialModem`] - channel-backed modem fed by tokio serial tasks
//! - [`MemoryModem`] - in-memory modem for tests and simulations

mod memory;
mod serial;

pub use memory::MemoryModem;
pub use serial::{open_serial, SerialConfig, SerialModem, SerialTasks};

use crate::control::AtCommand;
use crate::diag::Escaped;
use crate::error::Result;

/// Byte-level link to the modem.
///
/// `read_byte` must never block: returning `None` means "nothing has arrived
/// yet" and the caller will try again on a later tick.
pub trait Modem {
    /// Next received byte, if one is already available.
    fn read_byte(&mut self) -> Option<u8>;

    /// Queue bytes for transmission to the modem.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// `true` once the link is gone for good and no received bytes remain.
    fn is_closed(&self) -> bool {
        false
    }

    /// Format and send an AT command line.
    fn send_command(&mut self, command: &AtCommand<'_>) -> Result<()> {
        let line = command.encode()?;
        tracing::debug!("AT> {}", Escaped(line.as_bytes()));
        self.write_all(line.as_bytes())
    }
}

impl<M: Modem + ?Sized> Modem for &mut M {
    #[inline]
    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }

    #[inline]
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_all(data)
    }

    #[inline]
    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}
