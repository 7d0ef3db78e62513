//! In-memory modem.
//!
//! Plays the modem side of the serial link without hardware: tests inject
//! the bytes the modem would emit and inspect what the station wrote. Canned
//! responses can be attached to command prefixes so a full handshake runs
//! synchronously.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::Modem;
use crate::error::{Result, WifiError};

#[derive(Debug, Default)]
struct Inner {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    responses: Vec<(Vec<u8>, Vec<u8>)>,
    closed: bool,
}

/// Shared in-memory modem. Clones refer to the same link.
#[derive(Debug, Clone, Default)]
pub struct MemoryModem {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryModem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue bytes as if the modem had sent them.
    pub fn inject(&self, bytes: &[u8]) {
        self.lock().inbound.extend(bytes.iter().copied());
    }

    /// Reply with `response` whenever a write starts with `command`.
    pub fn on_command(&self, command: &str, response: &str) {
        self.lock()
            .responses
            .push((command.as_bytes().to_vec(), response.as_bytes().to_vec()));
    }

    /// Everything written so far, leaving it in place.
    pub fn output(&self) -> Vec<u8> {
        self.lock().outbound.clone()
    }

    /// Everything written so far, clearing the record.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().outbound)
    }

    /// Injected bytes not yet read by the station.
    pub fn pending_input(&self) -> usize {
        self.lock().inbound.len()
    }

    /// Make subsequent writes fail with [`WifiError::LinkClosed`]. Bytes
    /// already injected can still be read.
    pub fn close(&self) {
        self.lock().closed = true;
    }
}

impl Modem for MemoryModem {
    fn read_byte(&mut self) -> Option<u8> {
        self.lock().inbound.pop_front()
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(WifiError::LinkClosed);
        }
        inner.outbound.extend_from_slice(data);

        let reply = inner
            .responses
            .iter()
            .find(|(command, _)| data.starts_with(command))
            .map(|(_, response)| response.clone());
        if let Some(reply) = reply {
            inner.inbound.extend(reply);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        let inner = self.lock();
        inner.closed && inner.inbound.is_empty()
    }
}
