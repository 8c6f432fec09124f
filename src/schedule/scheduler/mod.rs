mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::error::ConfigError;
use super::jobs::Job;
use super::types::{RawTaskDescriptor, TaskDescriptor};
use worker::TaskWorker;

/// A validated descriptor bound to the job it triggers.
pub struct ScheduledTask {
    pub descriptor: TaskDescriptor,
    job: Arc<dyn Job>,
}

pub struct TaskScheduler {
    jobs: HashMap<&'static str, Arc<dyn Job>>,
}

impl TaskScheduler {
    pub fn new(jobs: Vec<Arc<dyn Job>>) -> Self {
        Self {
            jobs: jobs.into_iter().map(|job| (job.name(), job)).collect(),
        }
    }

    /// Validates every descriptor. Rejected entries are logged and returned
    /// alongside the usable ones; they never stop the others.
    pub fn build(&self, raw: &[RawTaskDescriptor]) -> (Vec<ScheduledTask>, Vec<ConfigError>) {
        let mut tasks = Vec::new();
        let mut errors = Vec::new();

        for entry in raw {
            let parsed = TaskDescriptor::parse(entry).and_then(|descriptor| {
                let job = self
                    .jobs
                    .get(descriptor.name.as_str())
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownTask(descriptor.name.clone()))?;
                Ok(ScheduledTask { descriptor, job })
            });

            match parsed {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    error!("skipping scheduled task: {}", e);
                    errors.push(e);
                }
            }
        }

        (tasks, errors)
    }

    /// Spawns one trigger loop per task. Must be called inside a tokio runtime.
    pub fn start(&self, tasks: Vec<ScheduledTask>) -> SchedulerHandle {
        let (shutdown, _) = watch::channel(false);
        let mut loops = Vec::with_capacity(tasks.len());

        for task in tasks {
            info!(
                task = %task.descriptor.name,
                unit = %task.descriptor.unit,
                "scheduling task"
            );
            let worker = TaskWorker::new(task.descriptor, task.job, shutdown.subscribe());
            loops.push(tokio::spawn(worker.run()));
        }

        if loops.is_empty() {
            warn!("scheduler started with no tasks");
        }

        SchedulerHandle {
            shutdown,
            loops: Mutex::new(loops),
        }
    }
}

/// Controls the trigger loops started by [`TaskScheduler::start`].
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerHandle {
    /// Stops new runs from starting. Runs already in progress finish.
    pub fn clear(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_cleared(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once every trigger loop has exited.
    pub async fn stopped(&self) {
        let mut loops = self.loops.lock().await;
        for handle in loops.drain(..) {
            if let Err(e) = handle.await {
                error!("scheduler loop ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::error::TaskError;
    use crate::schedule::jobs::JobContext;
    use crate::statistics::SourceError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingJob {
        name: &'static str,
        runs: AtomicUsize,
        fail: bool,
        work: Duration,
        finished: AtomicBool,
    }

    impl CountingJob {
        fn new(name: &'static str) -> Arc<Self> {
            Self::build(name, false, Duration::ZERO)
        }

        fn build(name: &'static str, fail: bool, work: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                runs: AtomicUsize::new(0),
                fail,
                work,
                finished: AtomicBool::new(false),
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _ctx: &JobContext) -> Result<(), TaskError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
            self.finished.store(true, Ordering::SeqCst);
            if self.fail {
                return Err(TaskError::Source(SourceError::Empty));
            }
            Ok(())
        }
    }

    fn every_second(name: &str) -> RawTaskDescriptor {
        RawTaskDescriptor {
            name: name.to_string(),
            interval: 1,
            unit: "seconds".to_string(),
            time: None,
        }
    }

    #[test]
    fn test_build_skips_invalid_entries() {
        let job = CountingJob::new("tick");
        let scheduler = TaskScheduler::new(vec![job as Arc<dyn Job>]);

        let mut bad_unit = every_second("tick");
        bad_unit.unit = "fortnight".to_string();
        let (tasks, errors) = scheduler.build(&[every_second("tick"), every_second("nope"), bad_unit]);

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].descriptor.name, "tick");
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ConfigError::UnknownTask(_)));
        assert!(matches!(errors[1], ConfigError::UnknownUnit { .. }));
    }

    #[tokio::test]
    async fn test_no_runs_after_stop() {
        let job = CountingJob::new("tick");
        let scheduler = TaskScheduler::new(vec![job.clone() as Arc<dyn Job>]);
        let (tasks, _) = scheduler.build(&[every_second("tick")]);
        let handle = scheduler.start(tasks);

        tokio::time::sleep(Duration::from_millis(2300)).await;
        assert!(job.runs() >= 1);

        handle.clear();
        handle.stopped().await;
        let at_stop = job.runs();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(job.runs(), at_stop);
        assert!(handle.is_cleared());
    }

    #[tokio::test]
    async fn test_failing_job_keeps_its_schedule() {
        let job = CountingJob::build("flaky", true, Duration::ZERO);
        let scheduler = TaskScheduler::new(vec![job.clone() as Arc<dyn Job>]);
        let (tasks, _) = scheduler.build(&[every_second("flaky")]);
        let handle = scheduler.start(tasks);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        handle.clear();
        handle.stopped().await;

        assert!(job.runs() >= 2);
    }

    #[tokio::test]
    async fn test_in_flight_run_completes() {
        let job = CountingJob::build("slow", false, Duration::from_millis(800));
        let scheduler = TaskScheduler::new(vec![job.clone() as Arc<dyn Job>]);
        let (tasks, _) = scheduler.build(&[every_second("slow")]);
        let handle = scheduler.start(tasks);

        while job.runs() == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.clear();
        handle.stopped().await;

        assert!(job.finished.load(Ordering::SeqCst));
        assert_eq!(job.runs(), 1);
    }

    #[tokio::test]
    async fn test_stop_without_tasks() {
        let scheduler = TaskScheduler::new(Vec::new());
        let handle = scheduler.start(Vec::new());
        handle.clear();
        handle.stopped().await;
    }
}
