//! Handler traits and the per-connection control sessions.
//!
//! Three handlers sit behind the transport: one for HTTP, one for text
//! commands, and one control session per connection id. Control sessions
//! are created on demand by a factory and can expire themselves through
//! [`RequestHandler::heartbeat`].
//!
//! # Example
//!
//! ```ignore
//! use commandstation_wifi::handler::{from_fn, HandlerSet};
//!
//! let mut handlers = HandlerSet::new();
//! handlers.set_command(from_fn(|ctx| {
//!     let _ = ctx.reply(b"<iDCC-EX>");
//! }));
//! handlers.set_control(|id| Box::new(ThrottleSession::new(id)));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use super::RequestContext;
use crate::protocol::ConnectionId;

/// Result of a periodic heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    /// The session is finished and can be dropped.
    Expired,
}

/// A request handler.
///
/// `handle` runs synchronously on the service thread. Any reply must be
/// written to the context before it returns.
pub trait RequestHandler: Send {
    fn handle(&mut self, ctx: &mut RequestContext<'_>);

    /// Called once per service tick while the transport is connected.
    fn heartbeat(&mut self, _now: Instant) -> Liveness {
        Liveness::Alive
    }
}

impl<H: RequestHandler + ?Sized> RequestHandler for Box<H> {
    fn handle(&mut self, ctx: &mut RequestContext<'_>) {
        (**self).handle(ctx)
    }

    fn heartbeat(&mut self, now: Instant) -> Liveness {
        (**self).heartbeat(now)
    }
}

/// Handler built from a closure. See [`from_fn`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> RequestHandler for FnHandler<F>
where
    F: FnMut(&mut RequestContext<'_>) + Send,
{
    fn handle(&mut self, ctx: &mut RequestContext<'_>) {
        (self.f)(ctx)
    }
}

/// Wrap a closure as a [`RequestHandler`].
pub fn from_fn<F>(f: F) -> FnHandler<F>
where
    F: FnMut(&mut RequestContext<'_>) + Send,
{
    FnHandler { f }
}

/// Handler that never replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReply;

impl RequestHandler for NoReply {
    fn handle(&mut self, _ctx: &mut RequestContext<'_>) {}
}

/// Creates a control session for a connection id.
pub type SessionFactory = Box<dyn FnMut(ConnectionId) -> Box<dyn RequestHandler> + Send>;

/// Periodic callback run on every connected tick.
pub type Housekeeping = Box<dyn FnMut(Instant) + Send>;

/// Control sessions keyed by connection id.
#[derive(Default)]
pub struct ControlSessions {
    factory: Option<SessionFactory>,
    sessions: HashMap<ConnectionId, Box<dyn RequestHandler>>,
}

impl ControlSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory<F>(factory: F) -> Self
    where
        F: FnMut(ConnectionId) -> Box<dyn RequestHandler> + Send + 'static,
    {
        Self {
            factory: Some(Box::new(factory)),
            sessions: HashMap::new(),
        }
    }

    /// Session for `id`, created through the factory on first use.
    ///
    /// Returns `None` when no factory is installed.
    pub fn get_or_create(&mut self, id: ConnectionId) -> Option<&mut Box<dyn RequestHandler>> {
        if !self.sessions.contains_key(&id) {
            let factory = self.factory.as_mut()?;
            tracing::debug!("Control session {} created", id);
            self.sessions.insert(id, factory(id));
        }
        self.sessions.get_mut(&id)
    }

    pub fn remove(&mut self, id: ConnectionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Heartbeat every session and drop the expired ones.
    pub fn heartbeat(&mut self, now: Instant) {
        self.sessions.retain(|id, session| match session.heartbeat(now) {
            Liveness::Alive => true,
            Liveness::Expired => {
                tracing::debug!("Control session {} expired", id);
                false
            }
        });
    }
}

impl fmt::Debug for ControlSessions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.sessions.keys().copied().collect();
        ids.sort();
        f.debug_struct("ControlSessions")
            .field("has_factory", &self.factory.is_some())
            .field("sessions", &ids)
            .finish()
    }
}

/// The three handler kinds plus the housekeeping hook.
pub struct HandlerSet {
    pub(crate) http: Box<dyn RequestHandler>,
    pub(crate) command: Box<dyn RequestHandler>,
    pub(crate) control: ControlSessions,
    housekeeping: Option<Housekeeping>,
}

impl Default for HandlerSet {
    fn default() -> Self {
        Self {
            http: Box::new(NoReply),
            command: Box::new(NoReply),
            control: ControlSessions::new(),
            housekeeping: None,
        }
    }
}

impl HandlerSet {
    /// Handlers that never reply and no control sessions.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_http(&mut self, handler: impl RequestHandler + 'static) {
        self.http = Box::new(handler);
    }

    pub fn set_command(&mut self, handler: impl RequestHandler + 'static) {
        self.command = Box::new(handler);
    }

    /// Install the control-session factory. Existing sessions are dropped.
    pub fn set_control<F>(&mut self, factory: F)
    where
        F: FnMut(ConnectionId) -> Box<dyn RequestHandler> + Send + 'static,
    {
        self.control = ControlSessions::with_factory(factory);
    }

    pub fn set_housekeeping<F>(&mut self, hook: F)
    where
        F: FnMut(Instant) + Send + 'static,
    {
        self.housekeeping = Some(Box::new(hook));
    }

    pub fn control_sessions(&self) -> &ControlSessions {
        &self.control
    }

    /// Periodic work: session heartbeats, then the user hook.
    pub fn housekeep(&mut self, now: Instant) {
        self.control.heartbeat(now);
        if let Some(hook) = self.housekeeping.as_mut() {
            hook(now);
        }
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSet")
            .field("control", &self.control)
            .field("housekeeping", &self.housekeeping.is_some())
            .finish()
    }
}
