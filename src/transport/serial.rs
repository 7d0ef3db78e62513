//! Channel-backed modem over an async serial stream.
//!
//! A tokio reader task moves whatever the port delivers into an mpsc
//! channel, and the writer task drains outbound bytes. The station side,
//! [`SerialModem`], only ever does `try_recv` for input, so a service tick
//! never waits on the port.
//!
//! # Example
//!
//! ```ignore
//! use commandstation_wifi::transport::{open_serial, SerialConfig};
//!
//! let stream = tokio::net::TcpStream::connect("192.168.1.20:4000").await?;
//! let (modem, tasks) = open_serial(stream, &SerialConfig::default());
//! ```

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

use super::Modem;
use crate::error::{Result, WifiError};
use crate::writer::{spawn_writer_task, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Default size of a single port read.
pub const DEFAULT_READ_CHUNK: usize = 256;

/// Serial driver configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Bytes requested from the port per read.
    pub read_chunk: usize,
    /// Received chunks buffered before the reader waits.
    pub inbound_capacity: usize,
    /// Outbound chunks buffered before the station blocks.
    pub outbound_capacity: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            read_chunk: DEFAULT_READ_CHUNK,
            inbound_capacity: DEFAULT_CHANNEL_CAPACITY,
            outbound_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Join handles for the serial pump tasks.
pub struct SerialTasks {
    pub reader: JoinHandle<Result<()>>,
    pub writer: JoinHandle<Result<()>>,
}

impl SerialTasks {
    /// Stop the reader. The writer stops by itself once the modem is dropped.
    pub fn abort_reader(&self) {
        self.reader.abort();
    }
}

/// Modem endpoint backed by the serial tasks.
///
/// Reads never block. Writes block the calling thread only while the
/// outbound channel is full, so this type belongs on a blocking worker
/// (see [`StationBuilder::serve`](crate::StationBuilder::serve)), not inside
/// an async task.
pub struct SerialModem {
    inbound: mpsc::Receiver<Bytes>,
    pending: Bytes,
    outbound: BytesMut,
    writer: WriterHandle,
    closed: bool,
}

impl Modem for SerialModem {
    fn read_byte(&mut self) -> Option<u8> {
        loop {
            if self.pending.has_remaining() {
                return Some(self.pending.get_u8());
            }
            match self.inbound.try_recv() {
                Ok(chunk) => self.pending = chunk,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        // Reclaims the previous chunk's storage once the writer dropped it.
        self.outbound.reserve(data.len());
        self.outbound.extend_from_slice(data);
        self.writer.blocking_send(self.outbound.split().freeze())
    }

    /// `true` once the port reported end of stream and every received byte
    /// has been read.
    fn is_closed(&self) -> bool {
        (self.closed && !self.pending.has_remaining()) || self.writer.is_closed()
    }
}

/// Split `io` and start the reader and writer tasks.
///
/// Must be called from within a tokio runtime.
pub fn open_serial<IO>(io: IO, config: &SerialConfig) -> (SerialModem, SerialTasks)
where
    IO: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(io);
    let (tx, rx) = mpsc::channel(config.inbound_capacity);

    let reader = tokio::spawn(reader_loop(read_half, tx, config.read_chunk));
    let (writer, writer_task) = spawn_writer_task(write_half, config.outbound_capacity);

    let modem = SerialModem {
        inbound: rx,
        pending: Bytes::new(),
        outbound: BytesMut::with_capacity(config.read_chunk),
        writer,
        closed: false,
    };

    (
        modem,
        SerialTasks {
            reader,
            writer: writer_task,
        },
    )
}

/// Reader loop - forwards every port read to the station as one chunk.
async fn reader_loop<R>(mut reader: R, tx: mpsc::Sender<Bytes>, read_chunk: usize) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(read_chunk);

    loop {
        buf.reserve(read_chunk);
        let n = match reader.read_buf(&mut buf).await {
            Ok(0) => {
                tracing::debug!("Serial link reached end of stream");
                return Ok(());
            }
            Ok(n) => n,
            Err(e) => return Err(WifiError::Io(e)),
        };

        tracing::trace!("Serial read {} bytes", n);
        if tx.send(buf.split().freeze()).await.is_err() {
            // Station dropped its modem
            return Ok(());
        }
    }
}
