use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use super::{Job, JobContext};
use crate::schedule::error::TaskError;
use crate::storage::CredentialStore;

pub const RESET_JOB: &str = "request_update";

#[derive(Debug, Default, Serialize)]
pub struct ResetReport {
    pub reset: usize,
    pub untouched: usize,
    pub failed: Vec<(Uuid, String)>,
}

/// Starts a new quota period by zeroing every user's counter.
pub struct ResetJob {
    store: Arc<dyn CredentialStore>,
    actor: Uuid,
}

impl ResetJob {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            actor: Uuid::new_v4(),
        }
    }

    pub async fn run_cycle(&self) -> Result<ResetReport, TaskError> {
        let owners = self.store.list_counter_owners().await?;
        let mut report = ResetReport::default();

        for user_id in owners {
            match self.store.reset_counter(user_id, self.actor).await {
                Ok(true) => report.reset += 1,
                Ok(false) => report.untouched += 1,
                Err(e) => {
                    error!(user_id = %user_id, "failed to reset counter: {}", e);
                    report.failed.push((user_id, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl Job for ResetJob {
    fn name(&self) -> &'static str {
        RESET_JOB
    }

    async fn run(&self, ctx: &JobContext) -> Result<(), TaskError> {
        info!(task = %ctx.task, "resetting request counters");
        let report = self.run_cycle().await?;
        info!(
            task = %ctx.task,
            reset = report.reset,
            untouched = report.untouched,
            failed = report.failed.len(),
            "request counters updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::{SubscriptionPlan, Token, User};
    use crate::storage::InMemoryStore;
    use chrono::{Duration, Utc};

    async fn user_with_usage(store: &InMemoryStore, used: usize) -> Uuid {
        let plan = SubscriptionPlan {
            id: Uuid::new_v4(),
            subscription_type: "basic".to_string(),
            request_per_day: 100,
        };
        store.insert_plan(&plan).await.unwrap();
        let user = User {
            id: Uuid::new_v4(),
            subscription_id: plan.id,
            name: "reset".to_string(),
            email: format!("{}@example.com", Uuid::new_v4()),
            password_hash: String::new(),
            is_active: true,
            created_at: Utc::now(),
        };
        let token = Token {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_key: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + Duration::days(1),
            is_active: true,
            created_at: Utc::now(),
        };
        store.create_user(&user, &token).await.unwrap();
        for _ in 0..used {
            store.try_consume_quota(user.id, 100).await.unwrap();
        }
        user.id
    }

    #[tokio::test]
    async fn test_reset_twice_is_noop() {
        let store = Arc::new(InMemoryStore::new());
        let busy = user_with_usage(&store, 7).await;
        let idle = user_with_usage(&store, 0).await;
        let job = ResetJob::new(store.clone());

        let first = job.run_cycle().await.unwrap();
        assert_eq!(first.reset, 1);
        assert_eq!(first.untouched, 1);
        assert!(first.failed.is_empty());
        let after_first = store.get_counter(busy).await.unwrap().unwrap();
        assert_eq!(after_first.total_request, 0);

        let second = job.run_cycle().await.unwrap();
        assert_eq!(second.reset, 0);
        assert_eq!(second.untouched, 2);
        assert_eq!(store.get_counter(busy).await.unwrap().unwrap(), after_first);
        assert_eq!(store.get_counter(idle).await.unwrap().unwrap().total_request, 0);
    }

    #[tokio::test]
    async fn test_reset_through_job_trait() {
        let store = Arc::new(InMemoryStore::new());
        let user = user_with_usage(&store, 3).await;
        let job = ResetJob::new(store.clone());

        assert_eq!(job.name(), RESET_JOB);
        job.run(&JobContext::detached(RESET_JOB)).await.unwrap();
        assert_eq!(store.get_counter(user).await.unwrap().unwrap().total_request, 0);
    }
}
