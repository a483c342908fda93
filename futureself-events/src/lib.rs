//! Future Self Events - Upstream Data Change Events
//!
//! Profile, goal and financial-snapshot changes are published here so that
//! derived caches can be invalidated. Delivery is best-effort: a sink that
//! panics is logged and never prevents the remaining sinks from running,
//! and publishing never blocks or fails the write path that produced the
//! event.
//!
//! # Key Types
//!
//! - `DomainEvent`: tagged union of upstream changes
//! - `DomainEventSink`: consumer of events
//! - `EventDispatcher`: fan-out to every registered sink

mod dispatch;
mod event;

pub use dispatch::EventDispatcher;
pub use event::{DomainEvent, DomainEventSink};
