//! The four hooks instrumented code calls: initialize, entry, exit, finalize.
//!
//! `Runtime` is the whole run state (event list, call stack, trace sink and
//! counter subsystem) as one explicit value. The rewriting tool creates it at
//! the top of `main`, passes it to every `on_entry`/`on_exit`, and consumes it
//! with `finalize` before a successful return.
//!
//! Every hook returns a `Result`; deciding whether an error ends the program is
//! left to the caller. `OrAbort` reproduces the classic behavior of printing
//! the error and exiting.

use std::fs::File;
use std::io::Write;

use log::{debug, error, info, warn};

use crate::clock::Timestamp;
use crate::config::{Config, Options, OrphanPolicy, UnderflowPolicy};
use crate::error::Error;
use crate::event::EventSpec;
use crate::perf::PerfCounters;
use crate::recorder::Recorder;
use crate::session::CounterSubsystem;
use crate::stack::CallStack;

/// Counts reported by `finalize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Entries accepted over the run.
    pub calls: u64,
    /// Data rows written, orphans flushed at finalize included.
    pub rows: u64,
    /// Frames still live at finalize and dropped unwritten.
    pub orphans_discarded: usize,
    /// Frames still live at finalize and written anyway.
    pub orphans_flushed: usize,
    /// Exits that found an empty stack.
    pub underflows: u64,
}

/// Run state for one monitored process.
pub struct Runtime<S: CounterSubsystem = PerfCounters, W: Write = File> {
    events: EventSpec,
    stack: CallStack<S::Session>,
    recorder: Recorder<W>,
    subsystem: S,
    options: Options,
    underflows: u64,
}

impl Runtime<PerfCounters, File> {
    /// Configure from the program's argument vector and start tracing with
    /// hardware counters.
    pub fn from_args<I, A>(args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        let config = Config::from_args(args)?;
        Self::initialize(config)
    }

    /// Open the trace file, write its header and start tracing with hardware
    /// counters.
    pub fn initialize(config: Config) -> Result<Self, Error> {
        Self::with_subsystem(config, PerfCounters::new())
    }
}

impl<S: CounterSubsystem> Runtime<S, File> {
    /// Like `initialize`, with a caller-supplied counter subsystem.
    ///
    /// The subsystem is brought up before the trace file is opened, so a run
    /// that cannot measure anything leaves no file behind.
    pub fn with_subsystem(config: Config, mut subsystem: S) -> Result<Self, Error> {
        subsystem.init(&config.events)?;
        let recorder = Recorder::create(&config.output)?;
        info!("trace output: {}", config.output.display());
        Self::assemble(config.events, config.options, subsystem, recorder)
    }
}

impl<S: CounterSubsystem, W: Write> Runtime<S, W> {
    /// Initialize `subsystem` for `events`, then assemble a runtime around an
    /// already-open recorder and write the header.
    pub fn with_recorder(
        events: EventSpec,
        options: Options,
        mut subsystem: S,
        recorder: Recorder<W>,
    ) -> Result<Self, Error> {
        subsystem.init(&events)?;
        Self::assemble(events, options, subsystem, recorder)
    }

    fn assemble(
        events: EventSpec,
        options: Options,
        subsystem: S,
        mut recorder: Recorder<W>,
    ) -> Result<Self, Error> {
        recorder.write_header(&events)?;
        info!("tracing events: {events}");
        Ok(Self {
            stack: CallStack::new(options.max_depth, options.window),
            events,
            recorder,
            subsystem,
            options,
            underflows: 0,
        })
    }

    pub fn events(&self) -> &EventSpec {
        &self.events
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn stack(&self) -> &CallStack<S::Session> {
        &self.stack
    }

    /// Record entry into `name` now. Returns the new frame's ordinal.
    pub fn on_entry(&mut self, name: &str) -> Result<u64, Error> {
        self.on_entry_at(name, Timestamp::now())
    }

    /// Record entry into `name` at an explicit timestamp.
    pub fn on_entry_at(&mut self, name: &str, ts: Timestamp) -> Result<u64, Error> {
        let ordinal = self
            .stack
            .push(&mut self.subsystem, &self.events, name, ts)?;
        debug!("{ordinal} entry: {name} at {ts}");
        Ok(ordinal)
    }

    /// Record exit from the innermost live frame now.
    ///
    /// `name` is only used for diagnostics; it is not matched against the
    /// frame being popped. Returns the popped ordinal, or `None` when the
    /// stack was empty and the underflow policy is `Report`.
    pub fn on_exit(&mut self, name: &str) -> Result<Option<u64>, Error> {
        self.on_exit_at(name, Timestamp::now())
    }

    /// Record exit from the innermost live frame at an explicit timestamp.
    pub fn on_exit_at(&mut self, name: &str, ts: Timestamp) -> Result<Option<u64>, Error> {
        let recorder = &mut self.recorder;
        let popped = self
            .stack
            .pop(&mut self.subsystem, &self.events, ts, |record| {
                recorder.write_row(record)
            });
        match popped {
            Ok(record) => {
                debug!("{} exit: {name} at {ts}", record.ordinal);
                Ok(Some(record.ordinal))
            }
            Err(Error::StackUnderflow) => {
                self.underflows += 1;
                match self.options.underflow {
                    UnderflowPolicy::Report => {
                        error!("exit from '{name}' with no matching entry; ignored");
                        Ok(None)
                    }
                    UnderflowPolicy::Abort => Err(Error::StackUnderflow),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Close the trace and shut the counter subsystem down.
    pub fn finalize(self) -> Result<RunSummary, Error> {
        self.finalize_at(Timestamp::now()).map(|(summary, _)| summary)
    }

    /// Finalize at an explicit timestamp and hand back the flushed sink.
    ///
    /// Frames still live are handled per `OrphanPolicy`: discarded by default,
    /// or written innermost first with `ts` as their end time.
    pub fn finalize_at(mut self, ts: Timestamp) -> Result<(RunSummary, W), Error> {
        let mut summary = RunSummary {
            calls: self.stack.pushed(),
            underflows: self.underflows,
            ..RunSummary::default()
        };

        if !self.stack.is_empty() {
            match self.options.orphans {
                OrphanPolicy::Discard => {
                    let lost = self.stack.discard_all();
                    warn!("{lost} frame(s) entered but never exited; not written");
                    summary.orphans_discarded = lost;
                }
                OrphanPolicy::Flush => {
                    let recorder = &mut self.recorder;
                    while !self.stack.is_empty() {
                        let record = self
                            .stack
                            .pop(&mut self.subsystem, &self.events, ts, |record| {
                                recorder.write_row(record)
                            })?;
                        debug!("{} flushed at finalize: {}", record.ordinal, record.name);
                        summary.orphans_flushed += 1;
                    }
                }
            }
        }

        summary.rows = self.recorder.rows();
        let sink = self.recorder.into_inner()?;
        self.subsystem.shutdown();
        info!("total function calls made = {}", summary.calls);
        Ok((summary, sink))
    }
}

impl<S: CounterSubsystem, W: Write> std::fmt::Debug for Runtime<S, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("events", &self.events)
            .field("depth", &self.stack.depth())
            .field("rows", &self.recorder.rows())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Print the error and exit with status 1 instead of returning it.
pub trait OrAbort<T> {
    fn or_abort(self) -> T;
}

impl<T> OrAbort<T> for Result<T, Error> {
    fn or_abort(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                error!("{err}");
                eprintln!("counterscope: {err}");
                std::process::exit(1);
            }
        }
    }
}
