//! Fan-out of domain events to registered sinks

use crate::{DomainEvent, DomainEventSink};
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Delivers each event to every registered sink independently.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    sinks: Vec<Arc<dyn DomainEventSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn DomainEventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn register(&mut self, sink: Arc<dyn DomainEventSink>) {
        self.sinks.push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Deliver to all sinks concurrently and wait for them.
    ///
    /// Returns the number of sinks that completed without panicking.
    pub async fn dispatch(&self, event: &DomainEvent) -> usize {
        let deliveries = self.sinks.iter().map(|sink| async move {
            let outcome = AssertUnwindSafe(sink.handle(event)).catch_unwind().await;
            if outcome.is_err() {
                tracing::warn!(
                    sink = sink.name(),
                    event = event.kind(),
                    subject_id = %event.subject_id(),
                    "Event sink panicked"
                );
            }
            outcome.is_ok()
        });

        join_all(deliveries)
            .await
            .into_iter()
            .filter(|delivered| *delivered)
            .count()
    }

    /// Deliver on a background task and return immediately.
    pub fn publish(&self, event: DomainEvent) -> tokio::task::JoinHandle<usize> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.dispatch(&event).await })
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("EventDispatcher").field("sinks", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use futureself_core::{EntityIdType, SubjectId};
    use tokio::sync::Mutex;

    struct RecordingSink {
        seen: Mutex<Vec<SubjectId>>,
    }

    #[async_trait]
    impl DomainEventSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn handle(&self, event: &DomainEvent) {
            self.seen.lock().await.push(event.subject_id());
        }
    }

    struct PanickingSink;

    #[async_trait]
    impl DomainEventSink for PanickingSink {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn handle(&self, _event: &DomainEvent) {
            panic!("sink exploded");
        }
    }

    fn profile_changed(subject_id: SubjectId) -> DomainEvent {
        DomainEvent::ProfileChanged {
            subject_id,
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_reaches_every_sink() {
        let first = Arc::new(RecordingSink {
            seen: Mutex::new(Vec::new()),
        });
        let second = Arc::new(RecordingSink {
            seen: Mutex::new(Vec::new()),
        });
        let dispatcher = EventDispatcher::new()
            .with_sink(first.clone())
            .with_sink(second.clone());

        let subject_id = SubjectId::now_v7();
        assert_eq!(dispatcher.dispatch(&profile_changed(subject_id)).await, 2);
        assert_eq!(*first.seen.lock().await, vec![subject_id]);
        assert_eq!(*second.seen.lock().await, vec![subject_id]);
    }

    #[tokio::test]
    async fn test_panicking_sink_does_not_block_others() {
        let recorder = Arc::new(RecordingSink {
            seen: Mutex::new(Vec::new()),
        });
        let dispatcher = EventDispatcher::new()
            .with_sink(Arc::new(PanickingSink))
            .with_sink(recorder.clone());

        let subject_id = SubjectId::now_v7();
        assert_eq!(dispatcher.dispatch(&profile_changed(subject_id)).await, 1);
        assert_eq!(recorder.seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_runs_in_background() {
        let recorder = Arc::new(RecordingSink {
            seen: Mutex::new(Vec::new()),
        });
        let dispatcher = EventDispatcher::new().with_sink(recorder.clone());

        let handle = dispatcher.publish(profile_changed(SubjectId::now_v7()));
        assert_eq!(handle.await.unwrap(), 1);
        assert_eq!(recorder.seen.lock().await.len(), 1);
    }
}
