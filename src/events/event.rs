//! # Lifecycle events emitted by the manager tree.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Manager events**: creation and shutdown of Root/App/Local managers
//! - **Task lifecycle events**: spawn, completion, failure, panic, timeout
//! - **Shutdown events**: graceful-wait outcomes and forced untracking
//! - **Housekeeping events**: config updates and invariant reconciliation
//!
//! The [`Event`] struct carries optional metadata: the manager coordinates
//! (`app`, `local`), the function-group and task id labels, error text,
//! counts, and durations.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so events can be ordered even when consumed out-of-order
//! through async channels.
//!
//! ## Example
//! ```
//! use std::time::Duration;
//! use tasktree::{Event, EventKind, Level};
//!
//! let ev = Event::now(EventKind::TaskCompleted)
//!     .with_level(Level::Local)
//!     .with_app("api")
//!     .with_local("handlers")
//!     .with_function("worker")
//!     .with_duration(Duration::from_millis(12));
//!
//! assert_eq!(ev.kind, EventKind::TaskCompleted);
//! assert_eq!(ev.app.as_deref(), Some("api"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Which tier of the manager tree an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// The process-wide root manager.
    Root,
    /// An application manager.
    App,
    /// A module-level local manager.
    Local,
}

impl Level {
    /// Returns a short stable label for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Level::Root => "root",
            Level::App => "app",
            Level::Local => "local",
        }
    }
}

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Manager events ===
    /// A manager joined the tree.
    ManagerCreated,
    /// A manager began shutting down.
    ManagerShutdown,

    // === Task lifecycle events ===
    /// A task was tracked and handed to the runtime.
    TaskSpawned,
    /// A task finished and was untracked (always emitted, with duration).
    TaskCompleted,
    /// A worker returned an error.
    TaskFailed,
    /// A worker panicked; the panic was caught by the cleanup block.
    TaskPanicked,
    /// A task hit its per-spawn deadline.
    TimeoutHit,

    // === Shutdown events ===
    /// Shutdown of the whole tree was requested (OS signal received).
    ShutdownRequested,
    /// All tasks of a local manager stopped within the grace period.
    AllStoppedWithin,
    /// The grace period elapsed with tasks still running.
    GraceExceeded,
    /// A function-group shutdown timed out and untracked its stragglers.
    FunctionShutdownTimeout,
    /// Tasks were forcibly untracked while possibly still running.
    OrphanedTasks,

    // === Housekeeping events ===
    /// A configuration update was applied.
    ConfigUpdated,
    /// Internal bookkeeping was reconciled after disagreeing with itself.
    InvariantViolation,
    /// A manager lookup or operation failed; `error` carries the reason.
    OperationError,
}

/// Runtime event with optional metadata.
///
/// ## Fields
/// - `seq`: unique sequence number (monotonically increasing)
/// - `at`: wall-clock timestamp (may go backwards, use for logging only)
/// - `kind`: event classification
/// - `level`, `app`, `local`, `function`, `task`: origin labels
/// - `error`, `count`, `duration`, `timeout`: outcome metadata
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Tier of the tree the event originated from.
    pub level: Option<Level>,
    /// Name of the owning app, if applicable.
    pub app: Option<String>,
    /// Name of the owning local manager, if applicable.
    pub local: Option<String>,
    /// Function-group label, if applicable.
    pub function: Option<String>,
    /// Task id, if applicable.
    pub task: Option<String>,
    /// Error message or reason code, if the event represents a failure.
    pub error: Option<String>,
    /// A count (orphaned tasks, residual tasks), if relevant.
    pub count: Option<usize>,
    /// Measured duration (task lifetime, operation time), if relevant.
    pub duration: Option<Duration>,
    /// The deadline in play (shutdown grace, per-task timeout), if relevant.
    pub timeout: Option<Duration>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            level: None,
            app: None,
            local: None,
            function: None,
            task: None,
            error: None,
            count: None,
            duration: None,
            timeout: None,
        }
    }

    /// Attaches the originating tree tier.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Attaches the owning app name.
    pub fn with_app(mut self, name: impl Into<String>) -> Self {
        self.app = Some(name.into());
        self
    }

    /// Attaches the owning local manager name.
    pub fn with_local(mut self, name: impl Into<String>) -> Self {
        self.local = Some(name.into());
        self
    }

    /// Attaches a function-group label.
    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.function = Some(name.into());
        self
    }

    /// Attaches a task id.
    pub fn with_task(mut self, id: impl Into<String>) -> Self {
        self.task = Some(id.into());
        self
    }

    /// Attaches an error message or reason code.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Attaches a count.
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    /// Attaches a measured duration.
    pub fn with_duration(mut self, d: Duration) -> Self {
        self.duration = Some(d);
        self
    }

    /// Attaches the deadline in play.
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }
}
