pub mod auth;
pub mod config;
pub mod schedule;
pub mod statistics;
pub mod storage;
pub mod utils;
pub mod web;

use std::sync::Arc;

use auth::{AdmissionPipeline, Registrar};
use schedule::{IngestJob, Job, ResetJob};
use statistics::StatisticSource;
use storage::{CredentialStore, StatisticStore};

pub const GIT_HASH: &str = env!("GIT_HASH");

/// Everything the HTTP handlers and the scheduler share.
pub struct AppContext {
    pub admission: Arc<AdmissionPipeline>,
    pub registrar: Arc<Registrar>,
    pub credentials: Arc<dyn CredentialStore>,
    pub statistics: Arc<dyn StatisticStore>,
    pub ingest: Arc<IngestJob>,
    pub reset: Arc<ResetJob>,
}

impl AppContext {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        statistics: Arc<dyn StatisticStore>,
        source: Arc<dyn StatisticSource>,
    ) -> Self {
        Self {
            admission: Arc::new(AdmissionPipeline::new(credentials.clone())),
            registrar: Arc::new(Registrar::new(credentials.clone())),
            ingest: Arc::new(IngestJob::new(source, statistics.clone())),
            reset: Arc::new(ResetJob::new(credentials.clone())),
            credentials,
            statistics,
        }
    }

    /// Jobs the schedule file may refer to by name.
    pub fn jobs(&self) -> Vec<Arc<dyn Job>> {
        vec![
            self.reset.clone() as Arc<dyn Job>,
            self.ingest.clone() as Arc<dyn Job>,
        ]
    }
}
