//! # In-process counters fed by the event pump.
//!
//! [`MetricsRegistry`] is a fixed set of atomic counters and gauges. The
//! root manager's event pump calls [`observe`](MetricsRegistry::observe)
//! for every bus event; the collector refreshes the live-tree gauges on its
//! sampling interval; the exposition server renders the whole registry as
//! plain text.
//!
//! Counters are monotone and lock-free; readers may observe values mid-burst
//! that are slightly behind the bus, which is fine for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::events::{Event, EventKind};

/// Atomic counters and gauges for the whole tree.
#[derive(Default)]
pub struct MetricsRegistry {
    tasks_spawned: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_panicked: AtomicU64,
    task_timeouts: AtomicU64,
    shutdowns: AtomicU64,
    grace_exceeded: AtomicU64,
    orphaned_tasks: AtomicU64,
    invariant_violations: AtomicU64,
    operation_errors: AtomicU64,
    config_updates: AtomicU64,
    live_apps: AtomicU64,
    live_locals: AtomicU64,
    live_tasks: AtomicU64,
}

impl MetricsRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one lifecycle event into the counters.
    pub fn observe(&self, ev: &Event) {
        match ev.kind {
            EventKind::TaskSpawned => {
                self.tasks_spawned.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::TaskCompleted => {
                self.tasks_completed.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::TaskFailed => {
                self.tasks_failed.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::TaskPanicked => {
                self.tasks_panicked.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::TimeoutHit => {
                self.task_timeouts.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::ManagerShutdown => {
                self.shutdowns.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::GraceExceeded | EventKind::FunctionShutdownTimeout => {
                self.grace_exceeded.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::OrphanedTasks => {
                self.orphaned_tasks
                    .fetch_add(ev.count.unwrap_or(0) as u64, Ordering::Relaxed);
            }
            EventKind::InvariantViolation => {
                self.invariant_violations.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::OperationError => {
                self.operation_errors.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::ConfigUpdated => {
                self.config_updates.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::ManagerCreated
            | EventKind::ShutdownRequested
            | EventKind::AllStoppedWithin => {}
        }
    }

    /// Refreshes the live-tree gauges from a sampled snapshot.
    pub fn set_live(&self, apps: usize, locals: usize, tasks: usize) {
        self.live_apps.store(apps as u64, Ordering::Relaxed);
        self.live_locals.store(locals as u64, Ordering::Relaxed);
        self.live_tasks.store(tasks as u64, Ordering::Relaxed);
    }

    /// Returns the total number of tasks recorded as orphaned.
    pub fn orphaned_total(&self) -> u64 {
        self.orphaned_tasks.load(Ordering::Relaxed)
    }

    /// Returns the total number of recovered worker panics.
    pub fn panicked_total(&self) -> u64 {
        self.tasks_panicked.load(Ordering::Relaxed)
    }

    /// Renders the registry in text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(1024);
        let counters = [
            ("tasktree_tasks_spawned_total", &self.tasks_spawned),
            ("tasktree_tasks_completed_total", &self.tasks_completed),
            ("tasktree_tasks_failed_total", &self.tasks_failed),
            ("tasktree_tasks_panicked_total", &self.tasks_panicked),
            ("tasktree_task_timeouts_total", &self.task_timeouts),
            ("tasktree_shutdowns_total", &self.shutdowns),
            ("tasktree_grace_exceeded_total", &self.grace_exceeded),
            ("tasktree_orphaned_tasks_total", &self.orphaned_tasks),
            (
                "tasktree_invariant_violations_total",
                &self.invariant_violations,
            ),
            ("tasktree_operation_errors_total", &self.operation_errors),
            ("tasktree_config_updates_total", &self.config_updates),
        ];
        for (name, value) in counters {
            render_series(&mut out, "counter", name, value.load(Ordering::Relaxed));
        }

        let gauges = [
            ("tasktree_live_apps", &self.live_apps),
            ("tasktree_live_locals", &self.live_locals),
            ("tasktree_live_tasks", &self.live_tasks),
        ];
        for (name, value) in gauges {
            render_series(&mut out, "gauge", name, value.load(Ordering::Relaxed));
        }

        out
    }
}

fn render_series(out: &mut String, kind: &str, name: &str, value: u64) {
    out.push_str("# TYPE ");
    out.push_str(name);
    out.push(' ');
    out.push_str(kind);
    out.push('\n');
    out.push_str(name);
    out.push(' ');
    out.push_str(&value.to_string());
    out.push('\n');
}
