use std::sync::Arc;

use chrono::Local;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::schedule::jobs::{Job, JobContext};
use crate::schedule::types::TaskDescriptor;

/// Trigger loop for one scheduled task.
pub struct TaskWorker {
    // validated schedule entry
    descriptor: TaskDescriptor,
    // job bound to descriptor.name
    job: Arc<dyn Job>,
    // flips to true when the scheduler is cleared
    shutdown: watch::Receiver<bool>,
}

impl TaskWorker {
    pub fn new(descriptor: TaskDescriptor, job: Arc<dyn Job>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            descriptor,
            job,
            shutdown,
        }
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub async fn run(mut self) {
        let name = self.descriptor.name.clone();
        let mut last = None;

        loop {
            if self.stopping() {
                break;
            }

            let now = Local::now().naive_local();
            let Some(next) = self.descriptor.schedule.next_run(now, last) else {
                error!(task = %name, "next run time out of range, stopping task");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(task = %name, next = %next, "waiting for next run");

            tokio::select! {
                _ = sleep(wait) => {}
                changed = self.shutdown.changed() => {
                    // a dropped handle counts as a stop request
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            if self.stopping() {
                break;
            }
            last = Some(next);

            // runs inline, so a task never overlaps itself
            let ctx = JobContext::new(name.clone(), self.shutdown.clone());
            if let Err(e) = self.job.run(&ctx).await {
                error!(task = %name, "task run failed: {}", e);
            }
        }

        info!(task = %name, "task stopped");
    }
}
