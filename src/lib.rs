//! # tasktree
//!
//! **Tasktree** is a hierarchical task orchestration library.
//!
//! It imposes a three-level tree (Root → App → Local) onto the tasks of a
//! process, so that every task is tracked by a stable identity, reachable
//! through a cancellation path from any ancestor, and reliably accounted
//! for during shutdown — no orphaned tasks that outlive their owners, no
//! tracking records that are never removed.
//!
//! ## Features
//!
//! | Area             | Description                                                        | Key types / traits                       |
//! |------------------|--------------------------------------------------------------------|------------------------------------------|
//! | **Managers**     | Root/App/Local tiers with per-tier maps and cancellation contexts. | [`RootManager`], [`AppManager`], [`LocalManager`] |
//! | **Tasks**        | Tracked spawns with stable ids, wait groups, and per-task options. | [`Routine`], [`GoOption`], [`TaskState`] |
//! | **Shutdown**     | Graceful → timeout → force, scoped to tree, app, local, or group.  | `shutdown_tree`, `shutdown`, `shutdown_function` |
//! | **Events**       | Broadcast lifecycle events for logging and metrics.                | [`Event`], [`EventKind`], [`Bus`]        |
//! | **Metrics**      | Sink interface, counters registry, collector, exposition server.   | [`MetricsSink`], [`MetricsRegistry`], [`LogWriter`] |
//! | **Errors**       | Typed errors for orchestration and worker executions.              | [`RuntimeError`], [`TaskError`]          |
//! | **Configuration**| Runtime-mutable tree-wide settings.                                | [`Config`], [`ConfigUpdate`]             |
//!
//! ```no_run
//! use std::time::Duration;
//! use tasktree::{Config, GoOption, RootManager};
//!
//! #[tokio::main]
//! async fn main() {
//!     let root = RootManager::new(Config::default());
//!     let local = root.app("api").local("handlers");
//!
//!     // Spawn a tracked task; it stops when any ancestor shuts down.
//!     local.go(
//!         "poller",
//!         |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => return Ok(()),
//!                     _ = tokio::time::sleep(Duration::from_millis(100)) => {
//!                         // do work
//!                     }
//!                 }
//!             }
//!         },
//!         [GoOption::Timeout(Duration::from_secs(60))],
//!     );
//!
//!     // ... later: graceful tree-wide shutdown.
//!     root.shutdown_tree(true).await;
//! }
//! ```
//!
//! ---

mod config;
mod error;
mod events;
mod id;
mod manager;
mod metrics;
mod options;
mod signal;

// ---- Public re-exports ----

pub use config::{Config, ConfigUpdate, SharedConfig};
pub use error::{RuntimeError, TaskError};
pub use events::{Bus, Event, EventKind, Level};
pub use manager::{AppManager, LocalManager, RootManager, Routine, RoutineId, TaskState};
pub use metrics::{LogWriter, MetricsRegistry, MetricsSink, NoopSink};
pub use options::GoOption;
pub use signal::wait_for_shutdown_signal;
