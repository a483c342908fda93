//! Cache invalidation driven by upstream domain events.

use crate::service::LetterService;
use async_trait::async_trait;
use futureself_events::{DomainEvent, DomainEventSink, EventDispatcher};
use std::sync::Arc;

/// Invalidates a subject's cached simulation and letters whenever its
/// profile, goals or financial snapshots change.
#[derive(Debug, Clone)]
pub struct CacheInvalidationSink {
    service: LetterService,
}

impl CacheInvalidationSink {
    pub fn new(service: LetterService) -> Self {
        Self { service }
    }

    /// Register a sink for `service` on `dispatcher`.
    pub fn attach(service: LetterService, dispatcher: &mut EventDispatcher) {
        dispatcher.register(Arc::new(Self::new(service)));
    }
}

#[async_trait]
impl DomainEventSink for CacheInvalidationSink {
    fn name(&self) -> &str {
        "letter-cache-invalidation"
    }

    async fn handle(&self, event: &DomainEvent) {
        tracing::debug!(
            event = event.kind(),
            subject_id = %event.subject_id(),
            "Invalidating subject caches"
        );
        self.service.invalidate(event.subject_id()).await;
    }
}
