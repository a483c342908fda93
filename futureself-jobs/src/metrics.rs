//! Prometheus metrics for scheduled jobs.
//!
//! Metrics live on a per-instance [`Registry`] so several schedulers (or
//! tests) in one process do not collide on registration.

use crate::job::RunStatus;
use prometheus::{
    register_gauge_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, Encoder, GaugeVec, IntCounter, IntCounterVec, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Job counters and gauges.
#[derive(Clone)]
pub struct JobMetrics {
    registry: Registry,

    /// Finished runs - labels: job, outcome (skipped/completed/failed)
    pub job_runs_total: IntCounterVec,

    /// Processed subjects - labels: job, result (succeeded/failed)
    pub job_subjects_total: IntCounterVec,

    /// Subjects dropped from the retry queue after the last attempt
    pub retry_exhausted_total: IntCounter,

    /// Lock TTL chosen for the latest run - labels: job
    pub job_lock_ttl_seconds: GaugeVec,
}

impl JobMetrics {
    /// Create the metrics on a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> prometheus::Result<Self> {
        Ok(Self {
            job_runs_total: register_int_counter_vec_with_registry!(
                "futureself_job_runs_total",
                "Total number of finished scheduled job runs",
                &["job", "outcome"],
                registry
            )?,
            job_subjects_total: register_int_counter_vec_with_registry!(
                "futureself_job_subjects_total",
                "Total number of subjects processed by scheduled jobs",
                &["job", "result"],
                registry
            )?,
            retry_exhausted_total: register_int_counter_with_registry!(
                "futureself_retry_exhausted_total",
                "Total number of subjects dropped after exhausting retries",
                registry
            )?,
            job_lock_ttl_seconds: register_gauge_vec_with_registry!(
                "futureself_job_lock_ttl_seconds",
                "Lock TTL of the most recent run in seconds",
                &["job"],
                registry
            )?,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_run(&self, job: &str, status: RunStatus) {
        self.job_runs_total
            .with_label_values(&[job, status.as_str()])
            .inc();
    }

    pub fn record_subject(&self, job: &str, succeeded: bool) {
        let result = if succeeded { "succeeded" } else { "failed" };
        self.job_subjects_total
            .with_label_values(&[job, result])
            .inc();
    }

    pub fn record_retry_exhausted(&self) {
        self.retry_exhausted_total.inc();
    }

    pub fn set_lock_ttl(&self, job: &str, ttl: Duration) {
        self.job_lock_ttl_seconds
            .with_label_values(&[job])
            .set(ttl.as_secs_f64());
    }

    pub fn runs(&self, job: &str, status: RunStatus) -> u64 {
        self.job_runs_total
            .with_label_values(&[job, status.as_str()])
            .get()
    }

    pub fn subjects(&self, job: &str, succeeded: bool) -> u64 {
        let result = if succeeded { "succeeded" } else { "failed" };
        self.job_subjects_total
            .with_label_values(&[job, result])
            .get()
    }

    /// Render every metric in the Prometheus text format.
    pub fn export(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for JobMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobMetrics").finish_non_exhaustive()
    }
}
