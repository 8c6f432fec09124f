use std::path::Path;

pub mod error;
pub mod jobs;
pub mod scheduler;
pub mod types;

pub use error::{ConfigError, TaskError};
pub use jobs::{DataQualityError, IngestJob, IngestReport, Job, JobContext, ResetJob, ResetReport};
pub use scheduler::{ScheduledTask, SchedulerHandle, TaskScheduler};
pub use types::{IntervalUnit, RawTaskDescriptor, Schedule, TaskDescriptor};

/// Reads the schedule file: a JSON list of task descriptors.
pub async fn load_descriptors(path: &Path) -> Result<Vec<RawTaskDescriptor>, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(serde_json::from_str(&content)?)
}
