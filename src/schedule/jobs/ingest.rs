use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{DataQualityError, Job, JobContext};
use crate::schedule::error::TaskError;
use crate::statistics::StatisticSource;
use crate::storage::StatisticStore;

pub const INGEST_JOB: &str = "cases_update";

#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub fetched: usize,
    pub upserted: usize,
    pub unmatched: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: bool,
}

/// Pulls the latest per-country snapshot and upserts it, one row per country.
pub struct IngestJob {
    source: Arc<dyn StatisticSource>,
    store: Arc<dyn StatisticStore>,
    actor: Uuid,
}

impl IngestJob {
    pub fn new(source: Arc<dyn StatisticSource>, store: Arc<dyn StatisticStore>) -> Self {
        Self {
            source,
            store,
            actor: Uuid::new_v4(),
        }
    }

    pub async fn run_cycle(&self, ctx: &JobContext) -> Result<IngestReport, TaskError> {
        if ctx.is_cancelled() {
            info!(task = %ctx.task, "shutdown requested, skipping ingest");
            return Ok(IngestReport {
                skipped: true,
                ..IngestReport::default()
            });
        }

        let snapshots = self.source.fetch().await?;
        let countries: HashMap<String, Uuid> = self
            .store
            .list_countries()
            .await?
            .into_iter()
            .map(|c| (c.name.trim().to_lowercase(), c.id))
            .collect();

        let mut report = IngestReport {
            fetched: snapshots.len(),
            ..IngestReport::default()
        };

        for snapshot in snapshots {
            let Some(&country_id) = countries.get(&snapshot.country.trim().to_lowercase()) else {
                let issue = DataQualityError::UnmatchedCountry(snapshot.country.clone());
                warn!(task = %ctx.task, "{}", issue);
                report.unmatched.push(snapshot.country);
                continue;
            };

            match self
                .store
                .upsert_statistic(country_id, &snapshot.values, self.actor)
                .await
            {
                Ok(_) => report.upserted += 1,
                Err(e) => {
                    error!(task = %ctx.task, country = %snapshot.country, "failed to store statistic: {}", e);
                    report.failed.push((snapshot.country, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl Job for IngestJob {
    fn name(&self) -> &'static str {
        INGEST_JOB
    }

    async fn run(&self, ctx: &JobContext) -> Result<(), TaskError> {
        info!(task = %ctx.task, "updating statistics");
        let report = self.run_cycle(ctx).await?;
        if !report.skipped {
            info!(
                task = %ctx.task,
                fetched = report.fetched,
                upserted = report.upserted,
                unmatched = report.unmatched.len(),
                failed = report.failed.len(),
                "statistics updated"
            );
        }
        Ok(())
    }
}
