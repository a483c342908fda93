//! Process-wide scheduler for recurring jobs.

use crate::job::{JobRunReport, RunTrigger, ScheduledJob};
use crate::schedule::Schedule;
use futureself_core::{Clock, SystemClock};
use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;

struct Registration {
    job: Arc<dyn ScheduledJob>,
    schedule: Schedule,
}

/// Result of a manual trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualTriggerSummary {
    pub job: String,
    pub success: bool,
    pub message: String,
    pub report: Option<JobRunReport>,
}

/// Runs registered jobs on their schedules until shutdown.
///
/// Cross-instance exclusion is left to each job's lock; the scheduler only
/// decides when a job fires on this instance. A firing that comes due while
/// the previous run of the same job is still going is dropped.
pub struct Scheduler {
    jobs: Vec<Registration>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn register(mut self, job: Arc<dyn ScheduledJob>, schedule: Schedule) -> Self {
        tracing::info!(job = job.name(), schedule = %schedule, "Job registered");
        self.jobs.push(Registration { job, schedule });
        self
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|r| r.job.name()).collect()
    }

    /// Fire jobs on schedule until `shutdown` turns true or its sender drops.
    ///
    /// A run in progress when shutdown arrives is allowed to finish.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        tracing::info!(jobs = self.jobs.len(), "Scheduler started");
        join_all(
            self.jobs
                .iter()
                .map(|registration| self.run_loop(registration, shutdown.clone())),
        )
        .await;
        tracing::info!("Scheduler stopped");
    }

    async fn run_loop(&self, registration: &Registration, mut shutdown: watch::Receiver<bool>) {
        let job = &registration.job;
        loop {
            if *shutdown.borrow() {
                break;
            }
            let delay = registration.schedule.delay_until_next(self.clock.now());
            tracing::debug!(job = job.name(), delay_secs = delay.as_secs(), "Next run scheduled");

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {
                    let report = job.run(RunTrigger::Scheduled).await;
                    tracing::info!(
                        job = job.name(),
                        status = report.status.as_str(),
                        succeeded = report.succeeded,
                        failed = report.failed,
                        "Scheduled run finished"
                    );
                }
            }
        }
        tracing::debug!(job = job.name(), "Job loop stopped");
    }

    /// Run a job now, outside its schedule. Never fails.
    pub async fn trigger(&self, name: &str) -> ManualTriggerSummary {
        let Some(registration) = self.jobs.iter().find(|r| r.job.name() == name) else {
            return ManualTriggerSummary {
                job: name.to_string(),
                success: false,
                message: format!("Unknown job: {name}"),
                report: None,
            };
        };

        tracing::info!(job = name, "Manual trigger");
        match AssertUnwindSafe(registration.job.run(RunTrigger::Manual))
            .catch_unwind()
            .await
        {
            Ok(report) => ManualTriggerSummary {
                job: name.to_string(),
                success: report.is_success(),
                message: match &report.error {
                    Some(error) => format!("Run {}: {error}", report.status.as_str()),
                    None => format!(
                        "Run {}: {} succeeded, {} failed",
                        report.status.as_str(),
                        report.succeeded,
                        report.failed
                    ),
                },
                report: Some(report),
            },
            Err(_) => {
                tracing::error!(job = name, "Manual run panicked");
                ManualTriggerSummary {
                    job: name.to_string(),
                    success: false,
                    message: "Run panicked".to_string(),
                    report: None,
                }
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.job_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::RunStatus;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting {
        runs: AtomicUsize,
        panics: bool,
    }

    #[async_trait]
    impl ScheduledJob for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run(&self, trigger: RunTrigger) -> JobRunReport {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.panics {
                panic!("job blew up");
            }
            JobRunReport {
                job: "counting".to_string(),
                trigger,
                status: RunStatus::Completed,
                lock_ttl: Duration::ZERO,
                subjects_total: 0,
                succeeded: 0,
                failed: 0,
                error: None,
                started_at: Utc::now(),
                finished_at: Utc::now(),
            }
        }
    }

    fn counting(panics: bool) -> Arc<Counting> {
        Arc::new(Counting {
            runs: AtomicUsize::new(0),
            panics,
        })
    }

    #[tokio::test]
    async fn test_trigger_unknown_job() {
        let scheduler = Scheduler::new();
        let summary = scheduler.trigger("nope").await;
        assert!(!summary.success);
        assert!(summary.report.is_none());
    }

    #[tokio::test]
    async fn test_trigger_runs_job_manually() {
        let job = counting(false);
        let scheduler =
            Scheduler::new().register(job.clone(), Schedule::Every(Duration::from_secs(60)));
        let summary = scheduler.trigger("counting").await;
        assert!(summary.success);
        assert_eq!(summary.report.unwrap().trigger, RunTrigger::Manual);
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_trigger_contains_panic() {
        let scheduler =
            Scheduler::new().register(counting(true), Schedule::Every(Duration::from_secs(60)));
        let summary = scheduler.trigger("counting").await;
        assert!(!summary.success);
        assert_eq!(summary.message, "Run panicked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fires_on_interval_until_shutdown() {
        let job = counting(false);
        let scheduler = Arc::new(
            Scheduler::new().register(job.clone(), Schedule::Every(Duration::from_secs(60))),
        );
        let (tx, rx) = watch::channel(false);

        let runner = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(rx).await })
        };

        tokio::time::sleep(Duration::from_secs(185)).await;
        tx.send(true).unwrap();
        runner.await.unwrap();
        assert_eq!(job.runs.load(Ordering::SeqCst), 3);
    }
}
