//! Call stack of live frames and the pause/resume discipline between them.
//!
//! Only the top frame's counter session runs. Entering a child stops the
//! parent's session (its window closes); when the child exits, the parent gets
//! a fresh session and starts a new window. Descendant activity therefore never
//! counts against an ancestor. Ancestor totals are windowed, not continuous:
//! with `WindowMode::Last` a row carries the final window only, with
//! `WindowMode::Sum` the windows are added up.

use log::debug;

use crate::clock::Timestamp;
use crate::config::WindowMode;
use crate::error::{CounterError, Error};
use crate::event::EventSpec;
use crate::session::{CounterSession, CounterSubsystem, RawSession};

/// Longest function name stored, in bytes. Longer names are truncated.
pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Running,
    Paused,
    Stopped,
}

/// One live invocation.
#[derive(Debug)]
pub struct Frame<R: RawSession> {
    name: String,
    ordinal: u64,
    start: Timestamp,
    session: CounterSession<R>,
    paused: bool,
    values: Vec<i64>,
}

impl<R: RawSession> Frame<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn state(&self) -> FrameState {
        if self.paused {
            FrameState::Paused
        } else {
            FrameState::Running
        }
    }

    /// Counter values captured so far. Provisional until the frame is popped.
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    fn close_window(&mut self, mode: WindowMode) -> Result<(), CounterError> {
        let window = self.session.stop()?;
        match mode {
            WindowMode::Last => self.values = window,
            WindowMode::Sum => {
                for (acc, v) in self.values.iter_mut().zip(window) {
                    *acc = acc.saturating_add(v);
                }
            }
        }
        Ok(())
    }

    fn pause(&mut self, mode: WindowMode) -> Result<(), CounterError> {
        if !self.paused {
            self.close_window(mode)?;
            self.paused = true;
        }
        Ok(())
    }

    /// Start a new window on a fresh session. The stopped one is destroyed.
    fn resume<S>(&mut self, subsystem: &mut S, events: &EventSpec) -> Result<(), CounterError>
    where
        S: CounterSubsystem<Session = R>,
    {
        if !self.paused {
            return Ok(());
        }
        let mut session = CounterSession::create(subsystem, events)?;
        session.start()?;
        self.session = session;
        self.paused = false;
        Ok(())
    }

    fn finish(mut self, end: Timestamp, mode: WindowMode) -> Result<FrameRecord, CounterError> {
        if !self.paused {
            self.close_window(mode)?;
        }
        self.session.destroy();
        Ok(FrameRecord {
            name: self.name,
            ordinal: self.ordinal,
            start: self.start,
            end,
            values: self.values,
        })
    }
}

/// A stopped frame: everything the recorder writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub name: String,
    pub ordinal: u64,
    pub start: Timestamp,
    pub end: Timestamp,
    pub values: Vec<i64>,
}

/// Strictly nested stack of live frames.
#[derive(Debug)]
pub struct CallStack<R: RawSession> {
    frames: Vec<Frame<R>>,
    max_depth: usize,
    next_ordinal: u64,
    window: WindowMode,
}

impl<R: RawSession> CallStack<R> {
    pub fn new(max_depth: usize, window: WindowMode) -> Self {
        Self {
            frames: Vec::new(),
            max_depth,
            next_ordinal: 0,
            window,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn top(&self) -> Option<&Frame<R>> {
        self.frames.last()
    }

    /// Live frames, outermost first.
    pub fn frames(&self) -> impl Iterator<Item = &Frame<R>> {
        self.frames.iter()
    }

    /// Number of frames ever pushed; also the ordinal the next push receives.
    pub fn pushed(&self) -> u64 {
        self.next_ordinal
    }

    fn running_frames(&self) -> usize {
        self.frames.iter().filter(|f| !f.paused).count()
    }

    /// Enter `name`: pause the current top, then create and start a fresh
    /// session for the new frame. Returns the new frame's ordinal.
    ///
    /// Overflow is checked first, so a refused push leaves the stack untouched.
    /// If the new session cannot be opened the parent is resumed.
    pub fn push<S>(
        &mut self,
        subsystem: &mut S,
        events: &EventSpec,
        name: &str,
        start: Timestamp,
    ) -> Result<u64, Error>
    where
        S: CounterSubsystem<Session = R>,
    {
        if self.frames.len() >= self.max_depth {
            return Err(Error::StackOverflow {
                max_depth: self.max_depth,
                name: name.to_owned(),
            });
        }

        let window = self.window;
        if let Some(parent) = self.frames.last_mut() {
            parent.pause(window)?;
        }

        let session = match Self::open_session(subsystem, events) {
            Ok(session) => session,
            Err(err) => {
                if let Some(parent) = self.frames.last_mut() {
                    parent.resume(subsystem, events)?;
                }
                return Err(err.into());
            }
        };

        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.frames.push(Frame {
            name: bounded_name(name),
            ordinal,
            start,
            session,
            paused: false,
            values: vec![0; events.len()],
        });
        debug_assert_eq!(self.running_frames(), 1, "only the top frame may run");
        Ok(ordinal)
    }

    /// Exit the top frame: stop it, hand its record to `sink`, then resume the
    /// new top with a fresh window.
    ///
    /// `sink` runs while no session is counting, so recording cost is charged
    /// to nobody.
    pub fn pop<S, F>(
        &mut self,
        subsystem: &mut S,
        events: &EventSpec,
        end: Timestamp,
        sink: F,
    ) -> Result<FrameRecord, Error>
    where
        S: CounterSubsystem<Session = R>,
        F: FnOnce(&FrameRecord) -> Result<(), Error>,
    {
        let frame = self.frames.pop().ok_or(Error::StackUnderflow)?;
        let record = frame.finish(end, self.window)?;
        sink(&record)?;
        if let Some(parent) = self.frames.last_mut() {
            parent.resume(subsystem, events)?;
        }
        debug_assert!(self.frames.is_empty() || self.running_frames() == 1);
        Ok(record)
    }

    fn open_session<S>(
        subsystem: &mut S,
        events: &EventSpec,
    ) -> Result<CounterSession<R>, CounterError>
    where
        S: CounterSubsystem<Session = R>,
    {
        let mut session = CounterSession::create(subsystem, events)?;
        session.start()?;
        Ok(session)
    }

    /// Drop every live frame without recording it. Returns how many were lost.
    pub fn discard_all(&mut self) -> usize {
        let count = self.frames.len();
        for frame in self.frames.drain(..).rev() {
            debug!(
                "discarding unexited frame #{} {}",
                frame.ordinal, frame.name
            );
        }
        count
    }
}

fn bounded_name(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name.to_owned();
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_owned()
}
