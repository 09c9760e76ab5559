use std::path::PathBuf;

/// Bad or missing configuration, detected before any measurement begins.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no counter events specified (pass -trace-events=<list> or set COUNTERSCOPE_EVENTS)")]
    MissingEvents,

    #[error("empty event name in event list '{list}'")]
    EmptyEvent { list: String },

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("failed to open output file {}: {source}", path.display())]
    OpenOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure reported by (or on behalf of) the counter subsystem.
#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("unknown counter event '{name}'")]
    UnknownEvent { name: String },

    #[error("failed to register event '{event}': {source}")]
    Register {
        event: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{op} failed: {source}")]
    Subsystem {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot {op} a session that is {state}")]
    InvalidState { op: &'static str, state: &'static str },

    #[error("hardware counters are not supported on this platform")]
    Unsupported,
}

/// Top-level runtime error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("counter error: {0}")]
    Counter(#[from] CounterError),

    #[error("stack overflow: cannot enter '{name}', maximum nesting depth {max_depth} reached")]
    StackOverflow { max_depth: usize, name: String },

    #[error("exit with no matching entry (call stack is empty)")]
    StackUnderflow,

    #[error("failed to write trace record: {0}")]
    Record(#[from] csv::Error),
}

impl Error {
    /// Whether this error ends the run. Unmatched exits are reported and
    /// skipped; everything else means the trace can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::StackUnderflow)
    }
}
