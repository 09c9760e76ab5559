//! Hardware counters via Linux `perf_event_open`, through the `perf-event2`
//! crate.
//!
//! Each session is one counter group, so the whole group is reset, enabled,
//! disabled and read as a unit. Counting covers the calling thread in user
//! space only. On other platforms `init` and `create` fail with
//! `CounterError::Unsupported`.

use crate::error::CounterError;
use crate::event::EventSpec;
use crate::session::CounterSubsystem;

/// The `perf_event_open` counter subsystem.
#[derive(Debug, Default)]
pub struct PerfCounters {
    _private: (),
}

impl PerfCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::fmt;
    use std::io;

    use log::debug;
    use perf_event::events::{Hardware, Raw, Software};
    use perf_event::{Builder, Counter, Group};

    use crate::error::CounterError;
    use crate::event::EventSpec;
    use crate::session::RawSession;

    /// A resolved event in the crate's terms.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum EventCode {
        Hardware(Hardware),
        Software(Software),
        Raw(u64),
    }

    impl EventCode {
        fn builder(self) -> Builder<'static> {
            match self {
                Self::Hardware(event) => Builder::new(event),
                Self::Software(event) => Builder::new(event),
                Self::Raw(config) => Builder::new(Raw::new(config)),
            }
        }
    }

    /// Resolve an event name to its perf encoding.
    ///
    /// Accepts perf's generic event names, the common PAPI preset names mapped
    /// to their generic equivalents, and raw `r<hex>` codes.
    pub fn resolve_event(name: &str) -> Option<EventCode> {
        use EventCode::{Hardware as Hw, Software as Sw};

        let code = match name {
            "cycles" | "cpu-cycles" | "PAPI_TOT_CYC" => Hw(Hardware::CPU_CYCLES),
            "instructions" | "PAPI_TOT_INS" => Hw(Hardware::INSTRUCTIONS),
            "cache-references" | "PAPI_L3_TCA" => Hw(Hardware::CACHE_REFERENCES),
            "cache-misses" | "PAPI_L3_TCM" => Hw(Hardware::CACHE_MISSES),
            "branches" | "branch-instructions" | "PAPI_BR_INS" => {
                Hw(Hardware::BRANCH_INSTRUCTIONS)
            }
            "branch-misses" | "PAPI_BR_MSP" => Hw(Hardware::BRANCH_MISSES),
            "bus-cycles" => Hw(Hardware::BUS_CYCLES),
            "stalled-cycles-frontend" | "PAPI_STL_ICY" => Hw(Hardware::STALLED_CYCLES_FRONTEND),
            "stalled-cycles-backend" | "PAPI_RES_STL" => Hw(Hardware::STALLED_CYCLES_BACKEND),
            "ref-cycles" | "PAPI_REF_CYC" => Hw(Hardware::REF_CPU_CYCLES),
            "cpu-clock" => Sw(Software::CPU_CLOCK),
            "task-clock" => Sw(Software::TASK_CLOCK),
            "page-faults" | "faults" => Sw(Software::PAGE_FAULTS),
            "context-switches" | "cs" => Sw(Software::CONTEXT_SWITCHES),
            "cpu-migrations" | "migrations" => Sw(Software::CPU_MIGRATIONS),
            "minor-faults" => Sw(Software::PAGE_FAULTS_MIN),
            "major-faults" => Sw(Software::PAGE_FAULTS_MAJ),
            _ => {
                let hex = name.strip_prefix('r')?;
                if hex.is_empty() {
                    return None;
                }
                EventCode::Raw(u64::from_str_radix(hex, 16).ok()?)
            }
        };
        Some(code)
    }

    pub(super) fn resolve_all(events: &EventSpec) -> Result<Vec<EventCode>, CounterError> {
        events
            .names()
            .map(|name| {
                resolve_event(name).ok_or_else(|| CounterError::UnknownEvent {
                    name: name.to_owned(),
                })
            })
            .collect()
    }

    /// One counter group: a member counter per event, in event order.
    pub struct PerfSession {
        group: Option<Group>,
        counters: Vec<Counter>,
    }

    impl fmt::Debug for PerfSession {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("PerfSession")
                .field("counters", &self.counters.len())
                .field("open", &self.group.is_some())
                .finish()
        }
    }

    impl PerfSession {
        /// Open a disabled group holding one counter per event.
        pub(super) fn open(events: &EventSpec) -> Result<Self, CounterError> {
            let codes = resolve_all(events)?;
            let mut group = Group::new().map_err(|source| CounterError::Subsystem {
                op: "create",
                source,
            })?;
            let mut counters = Vec::with_capacity(codes.len());
            for (name, code) in events.names().zip(codes) {
                let counter = group
                    .add(&code.builder())
                    .map_err(|source| CounterError::Register {
                        event: name.to_owned(),
                        source,
                    })?;
                counters.push(counter);
            }
            Ok(Self {
                group: Some(group),
                counters,
            })
        }

        fn group(&mut self, op: &'static str) -> Result<&mut Group, CounterError> {
            self.group.as_mut().ok_or_else(|| CounterError::Subsystem {
                op,
                source: io::Error::new(io::ErrorKind::NotConnected, "session destroyed"),
            })
        }
    }

    impl RawSession for PerfSession {
        fn start(&mut self) -> Result<(), CounterError> {
            let group = self.group("start")?;
            group
                .reset()
                .and_then(|()| group.enable())
                .map_err(|source| CounterError::Subsystem { op: "start", source })
        }

        fn stop(&mut self) -> Result<Vec<i64>, CounterError> {
            let group = self.group("stop")?;
            let data = group
                .disable()
                .and_then(|()| group.read())
                .map_err(|source| CounterError::Subsystem { op: "stop", source })?;
            Ok(self
                .counters
                .iter()
                .map(|counter| i64::try_from(data[counter]).unwrap_or(i64::MAX))
                .collect())
        }

        fn destroy(&mut self) {
            // Members before the leader.
            self.counters.clear();
            if self.group.take().is_some() {
                debug!("perf group closed");
            }
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux::{EventCode, PerfSession, resolve_event};

#[cfg(not(target_os = "linux"))]
mod unsupported {
    use crate::error::CounterError;
    use crate::session::RawSession;

    /// Placeholder session type; never constructed off Linux.
    #[derive(Debug)]
    pub struct PerfSession {
        _private: (),
    }

    impl RawSession for PerfSession {
        fn start(&mut self) -> Result<(), CounterError> {
            Err(CounterError::Unsupported)
        }

        fn stop(&mut self) -> Result<Vec<i64>, CounterError> {
            Err(CounterError::Unsupported)
        }

        fn destroy(&mut self) {}
    }
}

#[cfg(not(target_os = "linux"))]
pub use unsupported::PerfSession;

impl CounterSubsystem for PerfCounters {
    type Session = PerfSession;

    /// Resolve every name, then open and close a trial group so that a
    /// missing PMU or a refused event fails here rather than at first entry.
    #[cfg(target_os = "linux")]
    fn init(&mut self, events: &EventSpec) -> Result<(), CounterError> {
        drop(PerfSession::open(events)?);
        log::debug!("perf counters available for {events}");
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn init(&mut self, _events: &EventSpec) -> Result<(), CounterError> {
        Err(CounterError::Unsupported)
    }

    #[cfg(target_os = "linux")]
    fn create(&mut self, events: &EventSpec) -> Result<PerfSession, CounterError> {
        PerfSession::open(events)
    }

    #[cfg(not(target_os = "linux"))]
    fn create(&mut self, _events: &EventSpec) -> Result<PerfSession, CounterError> {
        Err(CounterError::Unsupported)
    }
}
