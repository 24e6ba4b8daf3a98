//! # Simple logging sink for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//!
//! ## Output format
//! ```text
//! [spawned] api/handlers fn=worker id=AYx3...
//! [completed] api/handlers fn=worker took=12.3ms
//! [panicked] api/handlers fn=worker err="boom"
//! [grace-exceeded] api/handlers grace=10s
//! [orphaned] api/handlers count=3
//! [shutdown-requested]
//! ```
//!
//! Not intended for production use; implement a custom [`MetricsSink`] for
//! structured logging or a real metrics backend.

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::metrics::MetricsSink;

/// Stdout logging sink.
pub struct LogWriter;

impl LogWriter {
    fn scope(e: &Event) -> String {
        match (&e.app, &e.local) {
            (Some(app), Some(local)) => format!("{app}/{local}"),
            (Some(app), None) => app.clone(),
            _ => "-".to_string(),
        }
    }
}

#[async_trait]
impl MetricsSink for LogWriter {
    async fn handle(&self, e: &Event) {
        let scope = Self::scope(e);
        match e.kind {
            EventKind::ManagerCreated => {
                println!("[created] {scope} level={:?}", e.level);
            }
            EventKind::ManagerShutdown => {
                println!("[shutdown] {scope} level={:?}", e.level);
            }
            EventKind::TaskSpawned => {
                println!(
                    "[spawned] {scope} fn={:?} id={:?}",
                    e.function.as_deref().unwrap_or("-"),
                    e.task.as_deref().unwrap_or("-"),
                );
            }
            EventKind::TaskCompleted => {
                println!(
                    "[completed] {scope} fn={:?} took={:?}",
                    e.function.as_deref().unwrap_or("-"),
                    e.duration,
                );
            }
            EventKind::TaskFailed => {
                println!("[failed] {scope} fn={:?} err={:?}", e.function, e.error);
            }
            EventKind::TaskPanicked => {
                println!("[panicked] {scope} fn={:?} err={:?}", e.function, e.error);
            }
            EventKind::TimeoutHit => {
                println!("[timeout] {scope} fn={:?} after={:?}", e.function, e.timeout);
            }
            EventKind::ShutdownRequested => {
                println!("[shutdown-requested]");
            }
            EventKind::AllStoppedWithin => {
                println!("[all-stopped-within-grace] {scope}");
            }
            EventKind::GraceExceeded => {
                println!("[grace-exceeded] {scope} grace={:?}", e.timeout);
            }
            EventKind::FunctionShutdownTimeout => {
                println!(
                    "[function-timeout] {scope} fn={:?} after={:?}",
                    e.function, e.timeout
                );
            }
            EventKind::OrphanedTasks => {
                println!("[orphaned] {scope} count={:?}", e.count);
            }
            EventKind::ConfigUpdated => {
                println!("[config-updated]");
            }
            EventKind::InvariantViolation => {
                println!("[invariant] {scope} detail={:?}", e.error);
            }
            EventKind::OperationError => {
                println!("[op-error] {scope} reason={:?}", e.error);
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
