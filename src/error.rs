use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read trace {}: {source}", path.display())]
    TraceReadError {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid trace {}: {reason}", path.display())]
    InvalidTrace { path: PathBuf, reason: String },

    #[error("no column named '{column}' -- available: {available}")]
    UnknownColumn { column: String, available: String },

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
