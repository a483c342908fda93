//! Tracing initialisation and the job telemetry side channel.

use async_trait::async_trait;
use chrono::Utc;
use futureself_core::{SubjectId, Timestamp};
use serde::Serialize;
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "futureself=debug,info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Environment (production, staging, development)
    pub environment: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: std::env::var("FUTURESELF_SERVICE_NAME")
                .unwrap_or_else(|_| "futureself-jobs".to_string()),
            environment: std::env::var("FUTURESELF_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            log_format: std::env::var("FUTURESELF_LOG_FORMAT")
                .map(|raw| LogFormat::parse(&raw))
                .unwrap_or(LogFormat::Json),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to init subscriber: {0}")]
    SubscriberInit(String),
}

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `futureself=debug,info`.
/// Call once at startup; a second call fails.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };
    installed.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(
        service_name = config.service_name,
        environment = config.environment,
        log_format = ?config.log_format,
        "Telemetry initialized"
    );
    Ok(())
}

// ============================================================================
// TELEMETRY EVENTS
// ============================================================================

/// A product-analytics style event emitted by jobs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub name: &'static str,
    pub job: String,
    pub subject_id: Option<SubjectId>,
    pub detail: Option<String>,
    pub at: Timestamp,
}

impl TelemetryEvent {
    pub fn new(name: &'static str, job: impl Into<String>) -> Self {
        Self {
            name,
            job: job.into(),
            subject_id: None,
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn subject(mut self, subject_id: SubjectId) -> Self {
        self.subject_id = Some(subject_id);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Destination for telemetry events.
///
/// `record` must return immediately and never fail; `flush` pushes out
/// anything buffered and is awaited in every job's cleanup path.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);

    async fn flush(&self);
}

/// Buffers events and emits them as tracing records on flush or when the
/// buffer fills.
#[derive(Debug)]
pub struct TracingTelemetry {
    buffer: Mutex<Vec<TelemetryEvent>>,
    capacity: usize,
}

impl TracingTelemetry {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TelemetryEvent>> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn drain(&self) -> Vec<TelemetryEvent> {
        std::mem::take(&mut *self.lock())
    }

    fn emit(events: Vec<TelemetryEvent>) {
        for event in events {
            tracing::info!(
                target: "futureself::telemetry",
                event = event.name,
                job = %event.job,
                subject_id = ?event.subject_id,
                detail = ?event.detail,
                at = %event.at,
                "telemetry"
            );
        }
    }
}

impl Default for TracingTelemetry {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        let full = {
            let mut buffer = self.lock();
            buffer.push(event);
            buffer.len() >= self.capacity
        };
        if full {
            Self::emit(self.drain());
        }
    }

    async fn flush(&self) {
        let events = self.drain();
        if !events.is_empty() {
            tracing::debug!(count = events.len(), "Flushing telemetry");
        }
        Self::emit(events);
    }
}
