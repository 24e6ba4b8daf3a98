//! Event bus for broadcasting lifecycle events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] through which
//! every manager in the tree reports its lifecycle: manager creation and
//! shutdown, task spawn/completion/panic, grace-period outcomes, orphan
//! counts, and config updates.
//!
//! - [`Bus::publish`] sends an event to all subscribers (non-blocking).
//! - [`Bus::subscribe`] creates a new receiver for consuming events.
//!
//! The root manager feeds one receiver into the metrics pipeline; tests and
//! embedding applications can subscribe additional receivers to observe the
//! tree directly.

use tokio::sync::broadcast;

use crate::events::Event;

/// Broadcast channel for lifecycle events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
    capacity: usize,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// Capacity is clamped to at least 1 so the channel is always valid.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Send errors are ignored: an event with no active subscribers is
    /// simply dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Subscribes to the bus and returns a new receiver.
    ///
    /// A slow receiver that falls more than the bus capacity behind observes
    /// a `Lagged` error and misses events; consumers should treat that as a
    /// gap, not as corruption.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Returns the configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
