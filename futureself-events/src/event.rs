//! Domain event types

use async_trait::async_trait;
use futureself_core::{SubjectId, Timestamp};
use serde::{Deserialize, Serialize};

/// An upstream change that may stale a subject's cached projections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    ProfileChanged {
        subject_id: SubjectId,
        occurred_at: Timestamp,
    },
    GoalChanged {
        subject_id: SubjectId,
        goal_name: Option<String>,
        occurred_at: Timestamp,
    },
    SnapshotCreated {
        subject_id: SubjectId,
        occurred_at: Timestamp,
    },
}

impl DomainEvent {
    pub fn subject_id(&self) -> SubjectId {
        match self {
            DomainEvent::ProfileChanged { subject_id, .. }
            | DomainEvent::GoalChanged { subject_id, .. }
            | DomainEvent::SnapshotCreated { subject_id, .. } => *subject_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::ProfileChanged { .. } => "profile_changed",
            DomainEvent::GoalChanged { .. } => "goal_changed",
            DomainEvent::SnapshotCreated { .. } => "snapshot_created",
        }
    }

    pub fn occurred_at(&self) -> Timestamp {
        match self {
            DomainEvent::ProfileChanged { occurred_at, .. }
            | DomainEvent::GoalChanged { occurred_at, .. }
            | DomainEvent::SnapshotCreated { occurred_at, .. } => *occurred_at,
        }
    }
}

/// Consumer of upstream domain events.
///
/// Handlers are infallible from the caller's point of view: errors must be
/// logged and absorbed inside the implementation.
#[async_trait]
pub trait DomainEventSink: Send + Sync {
    /// Sink name used in logs.
    fn name(&self) -> &str;

    async fn handle(&self, event: &DomainEvent);
}
