//! Deterministic counter subsystem with injectable values.
//!
//! `SyntheticCounters` stands in for hardware counters in tests and dry runs.
//! Each event has a running total that only moves when the shared
//! `SyntheticSource` handle is advanced; a session reports how far the totals
//! moved between its `start` and `stop`. Failures can be injected to exercise
//! error paths.

use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::rc::Rc;

use crate::error::CounterError;
use crate::event::EventSpec;
use crate::session::{CounterSubsystem, RawSession};

#[derive(Debug, Default)]
struct SourceState {
    totals: Vec<i64>,
    rejected: HashSet<String>,
    fail_next_create: bool,
    fail_next_start: bool,
    fail_next_stop: bool,
    live: usize,
    running: usize,
    max_running: usize,
    created: u64,
    created_while_running: u64,
    initialized: bool,
    shutdown: bool,
}

impl SourceState {
    fn total(&self, index: usize) -> i64 {
        self.totals.get(index).copied().unwrap_or(0)
    }

    fn check_registration(&self, events: &EventSpec) -> Result<(), CounterError> {
        match events.names().find(|name| self.rejected.contains(*name)) {
            Some(name) => Err(CounterError::Register {
                event: name.to_owned(),
                source: io::Error::new(io::ErrorKind::Unsupported, "event rejected"),
            }),
            None => Ok(()),
        }
    }
}

/// Handle for driving and inspecting a `SyntheticCounters` instance.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    state: Rc<RefCell<SourceState>>,
}

impl SyntheticSource {
    /// Add `deltas[i]` to event `i`'s running total.
    pub fn advance(&self, deltas: &[i64]) {
        let mut state = self.state.borrow_mut();
        if state.totals.len() < deltas.len() {
            state.totals.resize(deltas.len(), 0);
        }
        for (total, delta) in state.totals.iter_mut().zip(deltas) {
            *total += delta;
        }
    }

    /// Refuse registration of `name` in every later `create`.
    pub fn reject_event(&self, name: &str) {
        self.state.borrow_mut().rejected.insert(name.to_owned());
    }

    pub fn fail_next_create(&self) {
        self.state.borrow_mut().fail_next_create = true;
    }

    pub fn fail_next_start(&self) {
        self.state.borrow_mut().fail_next_start = true;
    }

    pub fn fail_next_stop(&self) {
        self.state.borrow_mut().fail_next_stop = true;
    }

    /// Sessions created and not yet destroyed.
    pub fn live_sessions(&self) -> usize {
        self.state.borrow().live
    }

    /// Sessions currently accumulating.
    pub fn running_sessions(&self) -> usize {
        self.state.borrow().running
    }

    /// Highest number of simultaneously running sessions seen so far.
    pub fn max_running_sessions(&self) -> usize {
        self.state.borrow().max_running
    }

    /// Sessions created over the source's lifetime.
    pub fn sessions_created(&self) -> u64 {
        self.state.borrow().created
    }

    /// Sessions created while another session was counting.
    pub fn sessions_created_while_running(&self) -> u64 {
        self.state.borrow().created_while_running
    }

    pub fn is_initialized(&self) -> bool {
        self.state.borrow().initialized
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.borrow().shutdown
    }
}

/// Counter subsystem driven entirely by its `SyntheticSource`.
#[derive(Debug, Default)]
pub struct SyntheticCounters {
    state: Rc<RefCell<SourceState>>,
}

impl SyntheticCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> SyntheticSource {
        SyntheticSource {
            state: Rc::clone(&self.state),
        }
    }
}

impl CounterSubsystem for SyntheticCounters {
    type Session = SyntheticSession;

    fn init(&mut self, events: &EventSpec) -> Result<(), CounterError> {
        let mut state = self.state.borrow_mut();
        state.check_registration(events)?;
        state.initialized = true;
        Ok(())
    }

    fn create(&mut self, events: &EventSpec) -> Result<SyntheticSession, CounterError> {
        let mut state = self.state.borrow_mut();
        if std::mem::take(&mut state.fail_next_create) {
            return Err(CounterError::Subsystem {
                op: "create",
                source: io::Error::other("injected create failure"),
            });
        }
        state.check_registration(events)?;
        if state.running > 0 {
            state.created_while_running += 1;
        }
        state.live += 1;
        state.created += 1;
        Ok(SyntheticSession {
            state: Rc::clone(&self.state),
            baseline: vec![0; events.len()],
            running: false,
            destroyed: false,
        })
    }

    fn shutdown(&mut self) {
        self.state.borrow_mut().shutdown = true;
    }
}

/// One synthetic measurement context.
#[derive(Debug)]
pub struct SyntheticSession {
    state: Rc<RefCell<SourceState>>,
    baseline: Vec<i64>,
    running: bool,
    destroyed: bool,
}

impl RawSession for SyntheticSession {
    fn start(&mut self) -> Result<(), CounterError> {
        let mut state = self.state.borrow_mut();
        if std::mem::take(&mut state.fail_next_start) {
            return Err(CounterError::Subsystem {
                op: "start",
                source: io::Error::other("injected start failure"),
            });
        }
        for (i, slot) in self.baseline.iter_mut().enumerate() {
            *slot = state.total(i);
        }
        self.running = true;
        state.running += 1;
        state.max_running = state.max_running.max(state.running);
        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<i64>, CounterError> {
        let mut state = self.state.borrow_mut();
        if std::mem::take(&mut state.fail_next_stop) {
            return Err(CounterError::Subsystem {
                op: "stop",
                source: io::Error::other("injected stop failure"),
            });
        }
        self.running = false;
        state.running -= 1;
        Ok(self
            .baseline
            .iter()
            .enumerate()
            .map(|(i, base)| state.total(i) - base)
            .collect())
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        let mut state = self.state.borrow_mut();
        if self.running {
            self.running = false;
            state.running -= 1;
        }
        state.live -= 1;
        self.destroyed = true;
    }
}
