//! # Error types used by the tasktree runtime and workers.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`] errors raised by the manager tree itself.
//! - [`TaskError`] errors returned by individual worker executions.
//!
//! Both types provide an `as_label` helper producing short stable
//! snake_case labels for metrics and event reason codes.

use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the manager tree.
///
/// These represent failures in the orchestration layer: missing managers,
/// graceful waits that exceeded their deadline, and invalid configuration.
///
/// `NotFound` variants are expected during racy access (a task may complete
/// and untrack itself between a list and a lookup); callers that don't care
/// should handle them silently.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No app manager is registered under this name.
    #[error("app '{name}' is not registered")]
    AppNotFound {
        /// The missing app name.
        name: String,
    },
    /// No local manager is registered under this `(app, local)` pair.
    #[error("local manager '{app}/{local}' is not registered")]
    LocalNotFound {
        /// Name of the owning app.
        app: String,
        /// The missing local manager name.
        local: String,
    },
    /// No tracked task carries this id.
    #[error("task '{id}' is not tracked")]
    TaskNotFound {
        /// The missing task id.
        id: String,
    },
    /// A function-group shutdown exceeded its deadline; the unresponsive
    /// tasks were untracked and left to run as orphans.
    #[error("shutdown timeout {timeout:?} exceeded for function '{function}'")]
    FunctionTimeout {
        /// The function group that failed to stop in time.
        function: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },
    /// A wait on a single task's completion latch exceeded its deadline.
    #[error("timeout {timeout:?} exceeded waiting for task '{id}'")]
    WaitTimeout {
        /// Id of the task that did not finish in time.
        id: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },
    /// A configuration update carried an unusable value.
    #[error("bad config: {reason}")]
    BadConfig {
        /// Human-readable validation failure.
        reason: String,
    },
    /// Internal bookkeeping disagreed with itself (e.g. a negative task
    /// counter). Recovered locally by reconciliation; surfaces only in
    /// metrics and events.
    #[error("internal invariant violated: {detail}")]
    InvariantViolation {
        /// What was observed.
        detail: String,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::AppNotFound { .. } => "app_not_found",
            RuntimeError::LocalNotFound { .. } => "local_not_found",
            RuntimeError::TaskNotFound { .. } => "task_not_found",
            RuntimeError::FunctionTimeout { .. } => "function_shutdown_timeout",
            RuntimeError::WaitTimeout { .. } => "task_wait_timeout",
            RuntimeError::BadConfig { .. } => "bad_config",
            RuntimeError::InvariantViolation { .. } => "invariant_violation",
        }
    }
}

/// # Errors produced by worker execution.
///
/// These represent failures of individual tracked tasks. [`TaskError::Canceled`]
/// signals cooperative termination and is treated as a graceful exit by the
/// tracking layer, not as a failure.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// Worker execution exceeded the per-task timeout option.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The per-task deadline that elapsed.
        timeout: Duration,
    },

    /// Non-recoverable error; the worker gave up on its own.
    #[error("fatal error: {reason}")]
    Fatal {
        /// Why the worker considers the failure terminal.
        reason: String,
    },

    /// Worker execution failed.
    #[error("execution failed: {reason}")]
    Fail {
        /// What went wrong.
        reason: String,
    },

    /// Worker observed its context cancellation and returned.
    ///
    /// This is **not an error** in the traditional sense, but signals
    /// intentional termination during shutdown.
    #[error("context canceled")]
    Canceled,
}

impl TaskError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }
}
