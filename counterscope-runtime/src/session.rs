//! Counter sessions: one measurement context per active invocation.
//!
//! A `CounterSubsystem` resolves event names and hands out backend sessions.
//! `CounterSession` wraps a backend session with an explicit lifecycle so that
//! misuse (stopping twice, starting a destroyed session) surfaces as a
//! `CounterError` instead of reaching the backend.

use crate::error::CounterError;
use crate::event::EventSpec;

/// The hardware (or synthetic) counter subsystem.
pub trait CounterSubsystem {
    type Session: RawSession;

    /// Bring the subsystem up for `events` before any session is created.
    /// Called once, from initialize; an error here means nothing can be
    /// measured.
    fn init(&mut self, events: &EventSpec) -> Result<(), CounterError>;

    /// Create a session with every event of `events` registered, not yet
    /// counting. Fails if a name cannot be resolved or registration is refused.
    fn create(&mut self, events: &EventSpec) -> Result<Self::Session, CounterError>;

    /// Release subsystem-wide resources. Called once, from finalize.
    fn shutdown(&mut self) {}
}

/// Backend primitives behind a `CounterSession`.
pub trait RawSession {
    /// Reset and begin accumulating.
    fn start(&mut self) -> Result<(), CounterError>;

    /// Halt accumulation and return one value per event, in registration order.
    fn stop(&mut self) -> Result<Vec<i64>, CounterError>;

    /// Release backend resources.
    fn destroy(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Stopped,
    Destroyed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Destroyed => "destroyed",
        }
    }
}

/// A backend session plus its lifecycle state.
///
/// `Created -> Running <-> Stopped -> Destroyed`. Destroying is idempotent and
/// also happens on drop.
#[derive(Debug)]
pub struct CounterSession<R: RawSession> {
    raw: R,
    state: SessionState,
    width: usize,
}

impl<R: RawSession> CounterSession<R> {
    /// Create a session for `events` through `subsystem`.
    pub fn create<S>(subsystem: &mut S, events: &EventSpec) -> Result<Self, CounterError>
    where
        S: CounterSubsystem<Session = R>,
    {
        let raw = subsystem.create(events)?;
        Ok(Self {
            raw,
            state: SessionState::Created,
            width: events.len(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn start(&mut self) -> Result<(), CounterError> {
        match self.state {
            SessionState::Created | SessionState::Stopped => {
                self.raw.start()?;
                self.state = SessionState::Running;
                Ok(())
            }
            other => Err(CounterError::InvalidState {
                op: "start",
                state: other.as_str(),
            }),
        }
    }

    /// Stop counting and return exactly one value per registered event.
    pub fn stop(&mut self) -> Result<Vec<i64>, CounterError> {
        if self.state != SessionState::Running {
            return Err(CounterError::InvalidState {
                op: "stop",
                state: self.state.as_str(),
            });
        }
        let mut values = self.raw.stop()?;
        self.state = SessionState::Stopped;
        // A backend reporting the wrong arity would break the column layout.
        values.resize(self.width, 0);
        Ok(values)
    }

    pub fn destroy(&mut self) {
        if self.state != SessionState::Destroyed {
            self.raw.destroy();
            self.state = SessionState::Destroyed;
        }
    }
}

impl<R: RawSession> Drop for CounterSession<R> {
    fn drop(&mut self) {
        self.destroy();
    }
}
