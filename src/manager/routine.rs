//! # Per-task bookkeeping record.
//!
//! A [`Routine`] is created by [`LocalManager::go`](crate::LocalManager::go)
//! and inserted into the tracking map before the task starts executing. All
//! behaviour is driven by the spawn/cleanup contract in the local manager;
//! the record itself only exposes accessors.
//!
//! ## State machine
//! ```text
//! Pending ──► Running ──► Terminating ──► Terminated
//! ```
//! `Pending` covers the window between tracking and the first poll of the
//! worker and should be transient. `Terminated` is absorbing: the `done`
//! latch is closed and the record has been removed from the map.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::id;

/// Stable identifier of a tracked task.
///
/// 22 ASCII characters, unique within the process for the life of the
/// process; safe to hold across operations.
pub type RoutineId = String;

/// Lifecycle state of a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Tracked, worker not yet polled.
    Pending = 0,
    /// Worker executing.
    Running = 1,
    /// Terminal cleanup block running.
    Terminating = 2,
    /// Cleanup finished; `done` is closed and the record untracked.
    Terminated = 3,
}

impl TaskState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            2 => TaskState::Terminating,
            _ => TaskState::Terminated,
        }
    }
}

/// Tracking record of one spawned task.
pub struct Routine {
    id: RoutineId,
    function_name: String,
    /// Cancel handle for the task's context. Safe to call from any state,
    /// any number of times.
    token: CancellationToken,
    /// Single-shot completion latch, closed exactly once by cleanup.
    done: CancellationToken,
    started_at: Instant,
    state: AtomicU8,
}

impl Routine {
    pub(crate) fn new(function_name: String, token: CancellationToken) -> Self {
        Self {
            id: id::next_id(),
            function_name,
            token,
            done: CancellationToken::new(),
            started_at: Instant::now(),
            state: AtomicU8::new(TaskState::Pending as u8),
        }
    }

    /// Returns the stable task id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the function-group label the task was spawned under.
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Returns a clone of the task's cancellation context.
    pub fn context(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancels the task's context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once the task's cleanup has closed the `done` latch.
    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Completes when the task's cleanup has run.
    pub async fn finished(&self) {
        self.done.cancelled().await;
    }

    /// Time elapsed since the record was created.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Closes the completion latch. Idempotent.
    pub(crate) fn finish(&self) {
        self.done.cancel();
    }

    pub(crate) fn done_token(&self) -> CancellationToken {
        self.done.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_routine_starts_pending_and_alive() {
        let r = Routine::new("worker".into(), CancellationToken::new());
        assert_eq!(r.state(), TaskState::Pending);
        assert!(!r.is_done());
        assert_eq!(r.id().len(), 22);
    }

    #[test]
    fn cancel_is_idempotent_across_states() {
        let r = Routine::new("worker".into(), CancellationToken::new());
        r.cancel();
        r.set_state(TaskState::Terminated);
        r.cancel();
        assert!(r.context().is_cancelled());
    }

    #[test]
    fn finish_closes_the_latch_once() {
        let r = Routine::new("worker".into(), CancellationToken::new());
        r.finish();
        r.finish();
        assert!(r.is_done());
    }
}
