pub mod ingest;
pub mod reset;

use async_trait::async_trait;
use tokio::sync::watch;

use super::error::TaskError;

pub use ingest::{IngestJob, IngestReport};
pub use reset::{ResetJob, ResetReport};

/// Problems in fetched data that are reported but never stop a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataQualityError {
    #[error("no country named `{0}`")]
    UnmatchedCountry(String),
}

/// Handed to every job invocation.
pub struct JobContext {
    pub task: String,
    shutdown: watch::Receiver<bool>,
}

impl JobContext {
    pub fn new(task: impl Into<String>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            task: task.into(),
            shutdown,
        }
    }

    /// For runs triggered outside the scheduler; never cancelled.
    pub fn detached(task: impl Into<String>) -> Self {
        let (_, shutdown) = watch::channel(false);
        Self::new(task, shutdown)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }
}

#[async_trait]
pub trait Job: Send + Sync {
    /// Name used in the schedule file.
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &JobContext) -> Result<(), TaskError>;
}
