//! Station builder and service loop.
//!
//! The [`StationBuilder`] provides a fluent API for configuring handlers
//! and building the station. The [`Station`] owns all transport state:
//! 1. Run the modem handshake once (`setup`)
//! 2. On every tick, run housekeeping and check reply deadlines
//! 3. Feed received bytes to the frame receiver, or to the reply
//!    transmitter while a reply is in flight
//! 4. Dispatch each completed frame and send its reply
//!
//! # Example
//!
//! ```ignore
//! use commandstation_wifi::{from_fn, Station, WifiConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = tokio::net::TcpStream::connect("127.0.0.1:4000").await?;
//!
//!     let handle = Station::builder(WifiConfig::new("Layout", "s3cret"))
//!         .command(from_fn(|ctx| {
//!             let _ = ctx.reply(b"<p1>");
//!         }))
//!         .serve(port)
//!         .await?;
//!
//!     handle.wait().await?;
//!     Ok(())
//! }
//! ```

use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::config::WifiConfig;
use crate::control::{AtCommand, ModemHandshake};
use crate::diag::Escaped;
use crate::error::{Result, WifiError};
use crate::handler::{dispatch, Dispatch, HandlerSet, RequestHandler};
use crate::protocol::{ConnectionId, Feed, FixedCursorBuffer, FrameReceiver, InboundFrame};
use crate::transmit::{ReplyTransmitter, Stage, TransmitAction, TransmitEvent};
use crate::transport::{open_serial, Modem, SerialConfig, SerialTasks};

/// Coarse transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Handshake not run or failed. Ticks do nothing.
    Disconnected,
    /// Scanning for and accumulating `+IPD` frames.
    Receiving,
    /// `AT+CIPSEND` sent, waiting for `>`.
    AwaitingPrompt,
    /// Reply sent, waiting for `SEND OK` before closing.
    AwaitingConfirmation,
}

/// Builder for configuring and creating a station.
pub struct StationBuilder {
    config: WifiConfig,
    handlers: HandlerSet,
    serial: SerialConfig,
}

impl StationBuilder {
    pub fn new(config: WifiConfig) -> Self {
        Self {
            config,
            handlers: HandlerSet::new(),
            serial: SerialConfig::default(),
        }
    }

    /// Handler for requests starting with an HTTP method.
    ///
    /// The connection is closed after every HTTP request.
    pub fn http(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.handlers.set_http(handler);
        self
    }

    /// Handler for `<...>` text commands.
    pub fn command(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.handlers.set_command(handler);
        self
    }

    /// Factory for per-connection control sessions.
    ///
    /// Without one, requests that are neither HTTP nor commands go
    /// unanswered.
    pub fn control<F>(mut self, factory: F) -> Self
    where
        F: FnMut(ConnectionId) -> Box<dyn RequestHandler> + Send + 'static,
    {
        self.handlers.set_control(factory);
        self
    }

    /// Hook run on every tick while connected, after session heartbeats.
    pub fn housekeeping<F>(mut self, hook: F) -> Self
    where
        F: FnMut(Instant) + Send + 'static,
    {
        self.handlers.set_housekeeping(hook);
        self
    }

    /// Channel sizes for [`serve`](Self::serve).
    ///
    /// Default: [`SerialConfig::default`]
    pub fn serial_config(mut self, serial: SerialConfig) -> Self {
        self.serial = serial;
        self
    }

    /// Build a station over any modem and clock.
    ///
    /// The handshake is not run; call [`Station::setup`].
    pub fn build<M: Modem, C: Clock>(self, modem: M, clock: C) -> Result<Station<M, C>> {
        self.config.validate()?;
        Ok(Station {
            buffer: FixedCursorBuffer::new(self.config.buffer_capacity),
            receiver: FrameReceiver::new(),
            transmitter: ReplyTransmitter::new(self.config.timeouts.reply()),
            handlers: self.handlers,
            config: self.config,
            modem,
            clock,
            connected: false,
        })
    }

    /// Serve a modem attached to `io` until shut down.
    ///
    /// This will:
    /// 1. Start the serial reader and writer tasks
    /// 2. Move the station onto a blocking worker
    /// 3. Run the handshake, then the service loop
    ///
    /// A handshake failure ends the worker; it is reported by
    /// [`StationHandle::wait`]. Shutdown is only observed once the handshake
    /// has finished.
    pub async fn serve<IO>(self, io: IO) -> Result<StationHandle>
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.config.validate()?;
        let (modem, serial) = open_serial(io, &self.serial);
        let mut station = self.build(modem, SystemClock)?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task = tokio::task::spawn_blocking(move || {
            station.setup()?;
            station.run_until(&mut shutdown_rx)
        });

        Ok(StationHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
            serial,
        })
    }
}

/// A running station started by [`StationBuilder::serve`].
pub struct StationHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
    serial: SerialTasks,
}

impl StationHandle {
    /// Ask the service loop to stop and wait for it.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.wait().await
    }

    /// Wait until the service loop ends on its own: handshake failure,
    /// link loss or a write error.
    pub async fn wait(self) -> Result<()> {
        let StationHandle {
            shutdown_tx,
            task,
            serial,
        } = self;
        let result = task.await;
        drop(shutdown_tx);
        serial.abort_reader();
        result?
    }
}

/// WiFi transport context.
///
/// Single-threaded and poll-driven: nothing here blocks except
/// [`setup`](Self::setup), and every tick handles at most one request.
pub struct Station<M, C> {
    config: WifiConfig,
    buffer: FixedCursorBuffer,
    receiver: FrameReceiver,
    transmitter: ReplyTransmitter,
    handlers: HandlerSet,
    modem: M,
    clock: C,
    connected: bool,
}

impl Station<(), ()> {
    /// Create a new station builder.
    pub fn builder(config: WifiConfig) -> StationBuilder {
        StationBuilder::new(config)
    }
}

impl<M: Modem, C: Clock> Station<M, C> {
    /// Run the modem handshake.
    ///
    /// Any request or reply in progress is abandoned. On failure the station
    /// stays disconnected and [`tick`](Self::tick) does nothing until
    /// `setup` succeeds.
    pub fn setup(&mut self) -> Result<()> {
        self.connected = false;
        self.receiver.reset();
        self.transmitter.reset();
        self.buffer.reset_for_write();

        match ModemHandshake::new(&self.config).run(&mut self.modem, &self.clock) {
            Ok(()) => {
                self.connected = true;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Wifi setup FAILED: {}", e);
                Err(e)
            }
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn state(&self) -> TransportState {
        if !self.connected {
            return TransportState::Disconnected;
        }
        match self.transmitter.stage() {
            None => TransportState::Receiving,
            Some(Stage::Prompt) => TransportState::AwaitingPrompt,
            Some(Stage::Confirmation) => TransportState::AwaitingConfirmation,
        }
    }

    /// One service tick.
    ///
    /// Reads every available byte until a frame completes, then dispatches
    /// it and returns, so at most one request is handled per tick.
    ///
    /// # Returns
    ///
    /// The number of bytes consumed from the modem.
    ///
    /// # Errors
    ///
    /// Only modem write failures; protocol problems are logged and
    /// recovered from.
    pub fn tick(&mut self) -> Result<usize> {
        if !self.connected {
            return Ok(0);
        }

        let now = self.clock.now();
        self.handlers.housekeep(now);

        if !self.transmitter.is_idle() {
            let action = self.transmitter.step(TransmitEvent::Tick, now);
            self.apply(action)?;
        }

        let mut consumed = 0;
        while let Some(byte) = self.modem.read_byte() {
            consumed += 1;

            if !self.transmitter.is_idle() {
                match self.transmitter.step(TransmitEvent::Byte(byte), now) {
                    // Not consumed: belongs to the receiver.
                    TransmitAction::TimedOut { .. } => {}
                    action => {
                        self.apply(action)?;
                        continue;
                    }
                }
            }

            match self.receiver.feed(byte, &mut self.buffer) {
                Feed::Pending | Feed::Dropped { .. } => {}
                Feed::Complete(frame) => {
                    self.handle_frame(frame)?;
                    return Ok(consumed);
                }
                Feed::Busy => {
                    // Frames are released right after dispatch.
                    tracing::error!("Receiver still holds a frame, released");
                    self.receiver.release();
                }
            }
        }
        Ok(consumed)
    }

    /// Tick until `shutdown` fires or its sender is dropped.
    ///
    /// Sleeps for the configured tick interval whenever a tick consumed
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`WifiError::NotConnected`] if the handshake has not succeeded,
    /// [`WifiError::LinkClosed`] once the modem link is gone, or a modem
    /// write error.
    pub fn run_until(&mut self, shutdown: &mut oneshot::Receiver<()>) -> Result<()> {
        if !self.connected {
            return Err(WifiError::NotConnected);
        }
        let idle = self.config.timeouts.tick_interval();

        loop {
            match shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Closed) => {
                    tracing::debug!("Station shutting down");
                    return Ok(());
                }
            }

            if self.tick()? == 0 {
                if self.modem.is_closed() {
                    tracing::warn!("Modem link closed");
                    return Err(WifiError::LinkClosed);
                }
                self.clock.sleep(idle);
            }
        }
    }

    pub fn config(&self) -> &WifiConfig {
        &self.config
    }

    pub fn buffer(&self) -> &FixedCursorBuffer {
        &self.buffer
    }

    pub fn handlers(&self) -> &HandlerSet {
        &self.handlers
    }

    pub fn modem(&self) -> &M {
        &self.modem
    }

    pub fn modem_mut(&mut self) -> &mut M {
        &mut self.modem
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn handle_frame(&mut self, frame: InboundFrame) -> Result<()> {
        let outcome = dispatch(&mut self.handlers, &mut self.buffer, frame);
        self.receiver.release();
        let connection_id = frame.connection_id;

        match outcome {
            Dispatch::NoReply { close } => {
                self.buffer.reset_for_write();
                if close {
                    self.modem.send_command(&AtCommand::Close { connection_id })?;
                }
                Ok(())
            }
            Dispatch::Reply { length, close } => {
                self.modem.send_command(&AtCommand::Send {
                    connection_id,
                    length,
                })?;
                self.transmitter
                    .begin(connection_id, length, close, self.clock.now());
                Ok(())
            }
        }
    }

    fn apply(&mut self, action: TransmitAction) -> Result<()> {
        match action {
            TransmitAction::Wait | TransmitAction::TimedOut { .. } => Ok(()),
            TransmitAction::SendReply {
                connection_id,
                length,
            } => {
                let readable = self.buffer.readable();
                let reply = &readable[..length.min(readable.len())];
                tracing::debug!("WifiReply {}: {}", connection_id, Escaped(reply));
                self.modem.write_all(reply)
            }
            TransmitAction::Close(connection_id) => {
                self.modem.send_command(&AtCommand::Close { connection_id })
            }
        }
    }
}

impl<M, C> std::fmt::Debug for Station<M, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("connected", &self.connected)
            .field("buffer", &self.buffer)
            .field("receiver", &self.receiver)
            .field("transmitter", &self.transmitter)
            .field("handlers", &self.handlers)
            .finish()
    }
}
