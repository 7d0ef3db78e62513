//! AT command set used by the transport.
//!
//! Commands are formatted into a fixed stack buffer so that sending one,
//! including the per-reply `AT+CIPSEND`, never touches the heap.

use std::fmt::{self, Write};

use crate::error::{Result, WifiError};
use crate::protocol::ConnectionId;

/// Longest encoded command line, CRLF included.
///
/// Fits `AT+CWJAP` with a 32-byte SSID and a 64-byte passphrase plus
/// escapes.
pub const LINE_CAPACITY: usize = 160;

/// Commands the transport sends to the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommand<'a> {
    /// `AT+RST`
    Reset,
    /// `AT+CWMODE=1`
    StationMode,
    /// `AT+CWHOSTNAME="<hostname>"`
    SetHostname { hostname: &'a str },
    /// `AT+CWJAP="<ssid>","<password>"`
    JoinNetwork { ssid: &'a str, password: &'a str },
    /// `AT+CIFSR`
    QueryAddress,
    /// `AT+CIPMUX=1`
    EnableMultiplex,
    /// `AT+CIPSERVER=1,<port>`
    StartServer { port: u16 },
    /// `AT+MDNS=1,"<hostname>.local","<servername>.local",<port>`
    AdvertiseMdns {
        hostname: &'a str,
        servername: &'a str,
        port: u16,
    },
    /// `AT+CIPSEND=<id>,<length>`
    Send {
        connection_id: ConnectionId,
        length: usize,
    },
    /// `AT+CIPCLOSE=<id>`
    Close { connection_id: ConnectionId },
}

impl AtCommand<'_> {
    /// Format the command followed by CRLF.
    ///
    /// # Errors
    ///
    /// Returns [`WifiError::CommandTooLong`] if the line exceeds
    /// [`LINE_CAPACITY`].
    pub fn encode(&self) -> Result<CommandLine> {
        let mut line = CommandLine::new();
        write!(line, "{}\r\n", self).map_err(|_| WifiError::CommandTooLong {
            capacity: LINE_CAPACITY,
        })?;
        Ok(line)
    }
}

impl fmt::Display for AtCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            AtCommand::Reset => f.write_str("AT+RST"),
            AtCommand::StationMode => f.write_str("AT+CWMODE=1"),
            AtCommand::SetHostname { hostname } => {
                write!(f, "AT+CWHOSTNAME=\"{}\"", Quoted(hostname))
            }
            AtCommand::JoinNetwork { ssid, password } => {
                write!(f, "AT+CWJAP=\"{}\",\"{}\"", Quoted(ssid), Quoted(password))
            }
            AtCommand::QueryAddress => f.write_str("AT+CIFSR"),
            AtCommand::EnableMultiplex => f.write_str("AT+CIPMUX=1"),
            AtCommand::StartServer { port } => write!(f, "AT+CIPSERVER=1,{}", port),
            AtCommand::AdvertiseMdns {
                hostname,
                servername,
                port,
            } => write!(
                f,
                "AT+MDNS=1,\"{}.local\",\"{}.local\",{}",
                Quoted(hostname),
                Quoted(servername),
                port
            ),
            AtCommand::Send {
                connection_id,
                length,
            } => write!(f, "AT+CIPSEND={},{}", connection_id, length),
            AtCommand::Close { connection_id } => write!(f, "AT+CIPCLOSE={}", connection_id),
        }
    }
}

/// String argument with the AT escapes for `"`, `,` and `\`.
struct Quoted<'a>(&'a str);

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            if matches!(c, '"' | ',' | '\\') {
                f.write_char('\\')?;
            }
            f.write_char(c)?;
        }
        Ok(())
    }
}

/// Stack buffer holding one encoded command line.
pub struct CommandLine {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl CommandLine {
    fn new() -> Self {
        Self {
            buf: [0u8; LINE_CAPACITY],
            len: 0,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Write for CommandLine {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let end = self.len + bytes.len();
        if end > LINE_CAPACITY {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }
}

impl fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&crate::diag::Escaped(self.as_bytes()), f)
    }
}
