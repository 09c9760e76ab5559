//! Per-call hardware counter tracing.
//!
//! Instrumented code calls four hooks: [`Runtime::from_args`] (or
//! [`Runtime::initialize`]) first thing in `main`, [`Runtime::on_entry`] at the
//! top of every traced function, [`Runtime::on_exit`] before each of its
//! returns, and [`Runtime::finalize`] before `main` returns successfully.
//!
//! Each traced invocation gets its own counter session. While a callee runs,
//! every caller's session is stopped, so a row's counter values never include
//! work done by functions it called. Completed invocations are appended to a
//! CSV trace, innermost first:
//!
//! ```text
//! function_name,start_timestamp,end_timestamp,cycles,instructions
//! inner,1700000000.000100000,1700000000.000200000,5120,8311
//! outer,1700000000.000000000,1700000000.000300000,2048,3001
//! ```
//!
//! One call stack per process is assumed: the hooks must be called in
//! properly nested order from a single thread.

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod perf;
pub mod recorder;
pub mod runtime;
pub mod session;
pub mod stack;
pub mod synthetic;

pub use clock::Timestamp;
pub use config::{Config, OrphanPolicy, Options, UnderflowPolicy, WindowMode};
pub use error::{ConfigError, CounterError, Error};
pub use event::EventSpec;
pub use perf::PerfCounters;
pub use recorder::Recorder;
pub use runtime::{OrAbort, RunSummary, Runtime};
pub use session::{CounterSession, CounterSubsystem, RawSession};
pub use stack::{CallStack, FrameRecord};
pub use synthetic::{SyntheticCounters, SyntheticSource};
