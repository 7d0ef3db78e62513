//! Reply transmission state machine.
//!
//! After `AT+CIPSEND=<id>,<len>` the modem answers with a `>` prompt once it
//! is ready to take the payload. For connections that are closed after the
//! reply, the transport then waits for `SEND OK\r\n` before issuing
//! `AT+CIPCLOSE`. Both waits are bounded by a deadline; a missed deadline
//! abandons the reply and the transport goes back to scanning for frames.
//!
//! ```text
//!   Idle ──begin──► AwaitingPrompt ──'>'──► Idle                  (keep open)
//!                         │           └───► AwaitingConfirmation  (close)
//!                         │                       │
//!                         │                  "SEND OK\r\n" ──► Idle + Close
//!                         └── deadline ──► Idle + TimedOut ◄── deadline
//! ```

use std::time::{Duration, Instant};

use crate::control::PatternMatcher;
use crate::protocol::ConnectionId;

/// Modem prompt: ready to accept the reply bytes.
pub const SEND_PROMPT: u8 = b'>';

/// Modem confirmation after a payload was handed to the network.
pub const SEND_CONFIRMATION: &str = "SEND OK\r\n";

/// Which wait ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Prompt,
    Confirmation,
}

/// Input to [`ReplyTransmitter::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitEvent {
    /// A byte received from the modem.
    Byte(u8),
    /// Time has passed with nothing received.
    Tick,
}

/// What the transport must do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitAction {
    /// Nothing to do. A byte event was consumed.
    Wait,
    /// The prompt arrived: write exactly `length` reply bytes now.
    SendReply {
        connection_id: ConnectionId,
        length: usize,
    },
    /// The reply was confirmed: send `AT+CIPCLOSE` for this connection.
    Close(ConnectionId),
    /// The deadline passed and the reply was abandoned. A byte event was
    /// *not* consumed and belongs to the frame receiver.
    TimedOut {
        connection_id: ConnectionId,
        stage: Stage,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    AwaitingPrompt {
        connection_id: ConnectionId,
        length: usize,
        close: bool,
        deadline: Instant,
    },
    AwaitingConfirmation {
        connection_id: ConnectionId,
        deadline: Instant,
    },
}

/// Drives one reply at a time through prompt and confirmation.
#[derive(Debug, Clone)]
pub struct ReplyTransmitter {
    state: State,
    timeout: Duration,
    confirmation: PatternMatcher,
}

impl ReplyTransmitter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: State::Idle,
            timeout,
            confirmation: PatternMatcher::new(SEND_CONFIRMATION),
        }
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// The wait in progress, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self.state {
            State::Idle => None,
            State::AwaitingPrompt { .. } => Some(Stage::Prompt),
            State::AwaitingConfirmation { .. } => Some(Stage::Confirmation),
        }
    }

    /// Connection of the reply in flight.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self.state {
            State::Idle => None,
            State::AwaitingPrompt { connection_id, .. }
            | State::AwaitingConfirmation { connection_id, .. } => Some(connection_id),
        }
    }

    /// Start waiting for the prompt of a reply of `length` bytes, sent
    /// after `AT+CIPSEND` went out at `now`.
    ///
    /// A reply still in flight is abandoned.
    pub fn begin(&mut self, connection_id: ConnectionId, length: usize, close: bool, now: Instant) {
        if let Some(previous) = self.connection_id() {
            tracing::warn!("Reply to {} abandoned for {}", previous, connection_id);
        }
        self.state = State::AwaitingPrompt {
            connection_id,
            length,
            close,
            deadline: now + self.timeout,
        };
    }

    /// Advance the machine by one event observed at `now`.
    ///
    /// Deadlines are checked before the event is looked at, so an expired
    /// wait is reported even while bytes keep arriving. In `Idle` every
    /// event yields [`TransmitAction::Wait`].
    pub fn step(&mut self, event: TransmitEvent, now: Instant) -> TransmitAction {
        match self.state {
            State::Idle => TransmitAction::Wait,

            State::AwaitingPrompt {
                connection_id,
                length,
                close,
                deadline,
            } => {
                if now > deadline {
                    return self.time_out(connection_id, Stage::Prompt);
                }
                match event {
                    TransmitEvent::Byte(SEND_PROMPT) => {
                        self.state = if close {
                            self.confirmation.reset();
                            State::AwaitingConfirmation {
                                connection_id,
                                deadline: now + self.timeout,
                            }
                        } else {
                            State::Idle
                        };
                        TransmitAction::SendReply {
                            connection_id,
                            length,
                        }
                    }
                    _ => TransmitAction::Wait,
                }
            }

            State::AwaitingConfirmation {
                connection_id,
                deadline,
            } => {
                if now > deadline {
                    return self.time_out(connection_id, Stage::Confirmation);
                }
                match event {
                    TransmitEvent::Byte(byte) if self.confirmation.feed(byte) => {
                        self.state = State::Idle;
                        TransmitAction::Close(connection_id)
                    }
                    _ => TransmitAction::Wait,
                }
            }
        }
    }

    /// Drop any reply in flight without reporting it.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.confirmation.reset();
    }

    fn time_out(&mut self, connection_id: ConnectionId, stage: Stage) -> TransmitAction {
        let waiting_for = match stage {
            Stage::Prompt => "'>'",
            Stage::Confirmation => "SEND OK",
        };
        tracing::warn!(
            "Timeout waiting for {} on {}, reply lost",
            waiting_for,
            connection_id
        );
        self.reset();
        TransmitAction::TimedOut {
            connection_id,
            stage,
        }
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::Idle => "Idle",
            State::AwaitingPrompt { .. } => "AwaitingPrompt",
            State::AwaitingConfirmation { .. } => "AwaitingConfirmation",
        }
    }
}

impl Default for ReplyTransmitter {
    fn default() -> Self {
        Self::new(Duration::from_millis(2_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(2_000);

    fn bytes(tx: &mut ReplyTransmitter, input: &[u8], now: Instant) -> Vec<TransmitAction> {
        input
            .iter()
            .map(|&b| tx.step(TransmitEvent::Byte(b), now))
            .filter(|a| *a != TransmitAction::Wait)
            .collect()
    }

    #[test]
    fn test_prompt_releases_reply() {
        let mut tx = ReplyTransmitter::new(TIMEOUT);
        let now = Instant::now();
        let id = ConnectionId::new(3);
        tx.begin(id, 4, false, now);
        assert_eq!(tx.state_name(), "AwaitingPrompt");

        let actions = bytes(&mut tx, b"\r\nOK\r\n> ", now);
        assert_eq!(
            actions,
            vec![TransmitAction::SendReply {
                connection_id: id,
                length: 4
            }]
        );
        assert!(tx.is_idle());
    }

    #[test]
    fn test_close_waits_for_confirmation() {
        let mut tx = ReplyTransmitter::new(TIMEOUT);
        let now = Instant::now();
        let id = ConnectionId::new(1);
        tx.begin(id, 10, true, now);

        tx.step(TransmitEvent::Byte(b'>'), now);
        assert_eq!(tx.state_name(), "AwaitingConfirmation");
        assert_eq!(tx.stage(), Some(Stage::Confirmation));

        let actions = bytes(&mut tx, b"\r\nRecv 10 bytes\r\n\r\nSEND OK\r\n", now);
        assert_eq!(actions, vec![TransmitAction::Close(id)]);
        assert!(tx.is_idle());
    }

    #[test]
    fn test_lone_k_does_not_confirm() {
        let mut tx = ReplyTransmitter::new(TIMEOUT);
        let now = Instant::now();
        tx.begin(ConnectionId::new(0), 2, true, now);
        tx.step(TransmitEvent::Byte(b'>'), now);

        assert!(bytes(&mut tx, b"K", now).is_empty());
        assert!(bytes(&mut tx, b"OK\r\n", now).is_empty());
        assert_eq!(tx.state_name(), "AwaitingConfirmation");
    }

    #[test]
    fn test_prompt_timeout_on_tick() {
        let mut tx = ReplyTransmitter::new(TIMEOUT);
        let start = Instant::now();
        let id = ConnectionId::new(2);
        tx.begin(id, 4, false, start);

        assert_eq!(tx.step(TransmitEvent::Tick, start + TIMEOUT), TransmitAction::Wait);
        assert_eq!(
            tx.step(TransmitEvent::Tick, start + TIMEOUT + Duration::from_millis(1)),
            TransmitAction::TimedOut {
                connection_id: id,
                stage: Stage::Prompt
            }
        );
        assert!(tx.is_idle());
    }

    #[test]
    fn test_late_prompt_is_not_consumed() {
        let mut tx = ReplyTransmitter::new(TIMEOUT);
        let start = Instant::now();
        tx.begin(ConnectionId::new(2), 4, false, start);

        let late = start + Duration::from_secs(3);
        assert!(matches!(
            tx.step(TransmitEvent::Byte(b'>'), late),
            TransmitAction::TimedOut { .. }
        ));
        assert!(tx.is_idle());
    }

    #[test]
    fn test_confirmation_deadline_refreshed_on_prompt() {
        let mut tx = ReplyTransmitter::new(TIMEOUT);
        let start = Instant::now();
        let id = ConnectionId::new(4);
        tx.begin(id, 4, true, start);

        let prompt_at = start + Duration::from_millis(1_500);
        tx.step(TransmitEvent::Byte(b'>'), prompt_at);

        let still_ok = start + Duration::from_millis(3_000);
        assert_eq!(tx.step(TransmitEvent::Tick, still_ok), TransmitAction::Wait);

        let expired = prompt_at + TIMEOUT + Duration::from_millis(1);
        assert_eq!(
            tx.step(TransmitEvent::Tick, expired),
            TransmitAction::TimedOut {
                connection_id: id,
                stage: Stage::Confirmation
            }
        );
    }

    #[test]
    fn test_idle_ignores_events() {
        let mut tx = ReplyTransmitter::default();
        let now = Instant::now();
        assert_eq!(tx.step(TransmitEvent::Byte(b'>'), now), TransmitAction::Wait);
        assert_eq!(tx.step(TransmitEvent::Tick, now), TransmitAction::Wait);
        assert_eq!(tx.stage(), None);
        assert_eq!(tx.timeout(), TIMEOUT);
    }

    #[test]
    fn test_begin_replaces_reply_in_flight() {
        let mut tx = ReplyTransmitter::new(TIMEOUT);
        let now = Instant::now();
        tx.begin(ConnectionId::new(1), 4, true, now);
        tx.begin(ConnectionId::new(2), 6, false, now);

        assert_eq!(tx.connection_id(), Some(ConnectionId::new(2)));
        assert_eq!(
            tx.step(TransmitEvent::Byte(b'>'), now),
            TransmitAction::SendReply {
                connection_id: ConnectionId::new(2),
                length: 6
            }
        );
    }
}
