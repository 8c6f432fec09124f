use std::path::PathBuf;

use crate::statistics::SourceError;
use crate::storage::StorageError;

/// A schedule entry that cannot be turned into a running task.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown task `{0}`")]
    UnknownTask(String),

    #[error("task `{task}`: unknown unit `{unit}`")]
    UnknownUnit { task: String, unit: String },

    #[error("task `{0}`: interval must be positive")]
    ZeroInterval(String),

    #[error("task `{task}`: interval {interval} {unit} exceeds the maximum of {max}")]
    IntervalTooLarge {
        task: String,
        interval: u64,
        unit: String,
        max: u64,
    },

    #[error("task `{task}`: bad time of day `{time}`")]
    BadTime { task: String, time: String },

    #[error("cannot read schedule file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed schedule file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One job invocation failed. The trigger loop logs it and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("source: {0}")]
    Source(#[from] SourceError),
}
