//! Runtime configuration taken from the instrumented program's arguments.
//!
//! The rewriting tool passes the program's full argument vector to
//! `initialize`. Flags use the `-name=value` form; anything else belongs to the
//! program and is ignored. Output path and event list fall back to the
//! `COUNTERSCOPE_OUTPUT` and `COUNTERSCOPE_EVENTS` environment variables.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::event::EventSpec;

pub const DEFAULT_OUTPUT: &str = "counterscope_output.csv";
pub const DEFAULT_MAX_DEPTH: usize = 1000;

pub const OUTPUT_ENV: &str = "COUNTERSCOPE_OUTPUT";
pub const EVENTS_ENV: &str = "COUNTERSCOPE_EVENTS";

const OUTPUT_FLAG: &str = "-output-file=";
const EVENTS_FLAGS: [&str; 2] = ["-trace-events=", "-trace-papievents="];
const MAX_DEPTH_FLAG: &str = "-max-depth=";
const WINDOW_FLAG: &str = "-window-mode=";
const ORPHANS_FLAG: &str = "-orphans=";
const UNDERFLOW_FLAG: &str = "-underflow=";

/// How an ancestor's measurement windows combine into its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowMode {
    /// The row carries the last window only; earlier windows are provisional.
    #[default]
    Last,
    /// The row carries the sum of all windows.
    Sum,
}

/// What finalize does with frames that entered but never exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Drop them unwritten.
    #[default]
    Discard,
    /// Pop and write them, innermost first, ending at finalize time.
    Flush,
}

/// What an exit with an empty stack does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnderflowPolicy {
    /// Log it and carry on.
    #[default]
    Report,
    /// Return `Error::StackUnderflow` to the caller.
    Abort,
}

/// Tunables that do not depend on where output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub max_depth: usize,
    pub window: WindowMode,
    pub orphans: OrphanPolicy,
    pub underflow: UnderflowPolicy,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            window: WindowMode::default(),
            orphans: OrphanPolicy::default(),
            underflow: UnderflowPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub output: PathBuf,
    pub events: EventSpec,
    pub options: Options,
}

impl Config {
    pub fn new(output: impl Into<PathBuf>, events: EventSpec) -> Self {
        Self {
            output: output.into(),
            events,
            options: Options::default(),
        }
    }

    /// Parse from an argument vector, falling back to the process environment.
    pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_args_with_env(args, |key| std::env::var(key).ok())
    }

    /// Parse from an argument vector with an explicit environment lookup.
    ///
    /// The first element is the program name and is skipped. For each flag
    /// the first occurrence wins.
    pub fn from_args_with_env<I, S, E>(args: I, env: E) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        E: Fn(&str) -> Option<String>,
    {
        let args: Vec<S> = args.into_iter().skip(1).collect();
        let find = |prefix: &str| {
            args.iter()
                .find_map(|a| a.as_ref().strip_prefix(prefix).map(str::to_owned))
        };

        let output = find(OUTPUT_FLAG)
            .or_else(|| env(OUTPUT_ENV))
            .unwrap_or_else(|| DEFAULT_OUTPUT.to_owned());

        let events = EVENTS_FLAGS
            .iter()
            .find_map(|flag| find(flag))
            .or_else(|| env(EVENTS_ENV))
            .ok_or(ConfigError::MissingEvents)?;
        let events = EventSpec::parse(&events)?;

        let mut options = Options::default();
        if let Some(v) = find(MAX_DEPTH_FLAG) {
            options.max_depth = match v.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(invalid("max-depth", v)),
            };
        }
        if let Some(v) = find(WINDOW_FLAG) {
            options.window = match v.as_str() {
                "last" => WindowMode::Last,
                "sum" => WindowMode::Sum,
                _ => return Err(invalid("window-mode", v)),
            };
        }
        if let Some(v) = find(ORPHANS_FLAG) {
            options.orphans = match v.as_str() {
                "discard" => OrphanPolicy::Discard,
                "flush" => OrphanPolicy::Flush,
                _ => return Err(invalid("orphans", v)),
            };
        }
        if let Some(v) = find(UNDERFLOW_FLAG) {
            options.underflow = match v.as_str() {
                "report" => UnderflowPolicy::Report,
                "abort" => UnderflowPolicy::Abort,
                _ => return Err(invalid("underflow", v)),
            };
        }

        Ok(Self {
            output: PathBuf::from(output),
            events,
            options,
        })
    }
}

fn invalid(key: &'static str, value: String) -> ConfigError {
    ConfigError::InvalidValue { key, value }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parses_output_and_events() {
        let cfg = Config::from_args_with_env(
            [
                "prog",
                "input.txt",
                "-output-file=/tmp/trace.csv",
                "-trace-events=cycles,instructions",
            ],
            no_env,
        )
        .unwrap();
        assert_eq!(cfg.output, PathBuf::from("/tmp/trace.csv"));
        assert_eq!(cfg.events.to_string(), "cycles,instructions");
        assert_eq!(cfg.options, Options::default());
    }

    #[test]
    fn legacy_events_flag_is_accepted() {
        let cfg =
            Config::from_args_with_env(["prog", "-trace-papievents=PAPI_TOT_CYC"], no_env).unwrap();
        assert_eq!(cfg.events.get(0), Some("PAPI_TOT_CYC"));
        assert_eq!(cfg.output, PathBuf::from(DEFAULT_OUTPUT));
    }

    #[test]
    fn missing_events_is_config_error() {
        let err = Config::from_args_with_env(["prog", "-output-file=x.csv"], no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEvents), "got: {err}");
    }

    #[test]
    fn program_name_is_never_a_flag() {
        let err = Config::from_args_with_env(["-trace-events=cycles"], no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEvents), "got: {err}");
    }

    #[test]
    fn first_occurrence_wins() {
        let cfg = Config::from_args_with_env(
            [
                "prog",
                "-trace-events=cycles",
                "-output-file=a.csv",
                "-output-file=b.csv",
                "-trace-events=instructions",
            ],
            no_env,
        )
        .unwrap();
        assert_eq!(cfg.output, PathBuf::from("a.csv"));
        assert_eq!(cfg.events.to_string(), "cycles");
    }

    #[test]
    fn env_fallback_applies_when_flags_absent() {
        let env = |key: &str| match key {
            OUTPUT_ENV => Some("env.csv".to_owned()),
            EVENTS_ENV => Some("branch-misses".to_owned()),
            _ => None,
        };
        let cfg = Config::from_args_with_env(["prog"], env).unwrap();
        assert_eq!(cfg.output, PathBuf::from("env.csv"));
        assert_eq!(cfg.events.to_string(), "branch-misses");

        let cfg = Config::from_args_with_env(["prog", "-trace-events=cycles"], env).unwrap();
        assert_eq!(cfg.events.to_string(), "cycles");
    }

    #[test]
    fn parses_policies() {
        let cfg = Config::from_args_with_env(
            [
                "prog",
                "-trace-events=cycles",
                "-max-depth=16",
                "-window-mode=sum",
                "-orphans=flush",
                "-underflow=abort",
            ],
            no_env,
        )
        .unwrap();
        assert_eq!(
            cfg.options,
            Options {
                max_depth: 16,
                window: WindowMode::Sum,
                orphans: OrphanPolicy::Flush,
                underflow: UnderflowPolicy::Abort,
            }
        );
    }

    #[test]
    fn rejects_bad_policy_values() {
        for bad in ["-max-depth=0", "-max-depth=lots", "-window-mode=avg", "-orphans=keep"] {
            let err = Config::from_args_with_env(["prog", "-trace-events=cycles", bad], no_env)
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { .. }),
                "{bad} gave: {err}"
            );
        }
    }
}
