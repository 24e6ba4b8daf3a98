//! # The manager hierarchy: Root → App → Local → Routine.
//!
//! Each tier owns exactly one map, guarded by its own read/write lock:
//! the root owns apps, an app owns locals, a local owns task records.
//! Cancellation flows the other way, through a chain of child
//! [`CancellationToken`](tokio_util::sync::CancellationToken)s, so
//! cancelling any ancestor reaches every descendant task.
//!
//! Locks are taken in parent → child order and are never held across an
//! `.await` or across a call into another manager; every cross-tier walk
//! snapshots the map first and operates on the snapshot.

mod app;
mod local;
mod root;
mod routine;

pub use app::AppManager;
pub use local::LocalManager;
pub use root::RootManager;
pub use routine::{Routine, RoutineId, TaskState};

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Read-locks a map, recovering the guard if a writer panicked: map updates
/// are single statements, so a poisoned guard still holds consistent data.
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-locks a map with the same poison recovery as [`read_lock`].
pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
