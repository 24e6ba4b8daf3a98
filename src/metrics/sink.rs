//! # The narrow interface the tree reports through.
//!
//! A [`MetricsSink`] receives every lifecycle [`Event`] published on the
//! bus: task spawns and completions, panics, shutdown outcomes, orphan
//! counts, and config updates. The tree assumes nothing about the sink
//! beyond thread safety; [`NoopSink`] is a valid implementation.
//!
//! ## Example
//! ```
//! use async_trait::async_trait;
//! use tasktree::{Event, EventKind, MetricsSink};
//!
//! struct PanicAlert;
//!
//! #[async_trait]
//! impl MetricsSink for PanicAlert {
//!     async fn handle(&self, ev: &Event) {
//!         if ev.kind == EventKind::TaskPanicked {
//!             // page someone
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "panic-alert"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Consumer of lifecycle events.
///
/// Implementations must be thread-safe; `handle` is called from the event
/// pump task and should avoid blocking operations.
#[async_trait]
pub trait MetricsSink: Send + Sync + 'static {
    /// Processes one lifecycle event.
    async fn handle(&self, event: &Event);

    /// Returns a stable sink name for diagnostics.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Sink that discards every event.
///
/// Useful as the default when no observability backend is wired up.
pub struct NoopSink;

#[async_trait]
impl MetricsSink for NoopSink {
    async fn handle(&self, _event: &Event) {}

    fn name(&self) -> &'static str {
        "noop"
    }
}
