//! # Global runtime configuration.
//!
//! [`Config`] defines tree-wide behavior: the shutdown grace period, the
//! metrics pipeline (enabled flag, exposition endpoint, sampling interval),
//! an advisory task ceiling, and the event-bus capacity.
//!
//! [`SharedConfig`] is the mutable-at-runtime handle every manager holds.
//! It is guarded by its own lock, and interval changes are re-published
//! through a [`tokio::sync::watch`] channel so a running collector observes
//! them without polling the lock.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use tasktree::Config;
//!
//! let mut cfg = Config::default();
//! cfg.shutdown_timeout = Duration::from_secs(30);
//! cfg.max_routines = 10_000;
//!
//! assert_eq!(cfg.max_routines, 10_000);
//! ```

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;

use crate::error::RuntimeError;

/// Global configuration for the manager tree.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time each graceful-shutdown stage may wait before the
    /// remaining tasks are forcibly untracked.
    pub shutdown_timeout: Duration,
    /// Whether the metrics exposition server and collector should run.
    pub metrics_enabled: bool,
    /// Bind address of the metrics exposition endpoint.
    pub metrics_endpoint: String,
    /// How often the collector samples live-tree gauges.
    pub update_interval: Duration,
    /// Advisory ceiling on concurrently tracked tasks (0 = unlimited).
    ///
    /// Spawns are never rejected; the value only feeds observability.
    pub max_routines: usize,
    /// Capacity of the lifecycle event bus.
    pub bus_capacity: usize,
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `shutdown_timeout = 10s`
    /// - `metrics_enabled = false`
    /// - `metrics_endpoint = "127.0.0.1:9464"`
    /// - `update_interval = 15s`
    /// - `max_routines = 0` (unlimited, advisory)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(10),
            metrics_enabled: false,
            metrics_endpoint: "127.0.0.1:9464".to_string(),
            update_interval: Duration::from_secs(15),
            max_routines: 0,
            bus_capacity: 1024,
        }
    }
}

/// A typed configuration update.
///
/// Updates are validated by [`SharedConfig::apply`]; values that cannot be
/// used fail with [`RuntimeError::BadConfig`] and leave the configuration
/// untouched.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum ConfigUpdate {
    /// Replace the graceful-shutdown grace period.
    ShutdownTimeout(Duration),
    /// Enable or disable the metrics pipeline in one step.
    Metrics {
        /// Run the exposition server and collector.
        enabled: bool,
        /// Bind address for the exposition endpoint.
        endpoint: String,
        /// Collector sampling interval.
        interval: Duration,
    },
    /// Replace the advisory task ceiling.
    MaxRoutines(usize),
    /// Replace the collector sampling interval.
    UpdateInterval(Duration),
}

/// Shared, runtime-mutable configuration handle.
///
/// Cloning is cheap; all clones observe the same values.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Config>>,
    interval_tx: Arc<watch::Sender<Duration>>,
}

impl SharedConfig {
    /// Wraps an initial configuration.
    pub fn new(cfg: Config) -> Self {
        let (interval_tx, _rx) = watch::channel(cfg.update_interval);
        Self {
            inner: Arc::new(RwLock::new(cfg)),
            interval_tx: Arc::new(interval_tx),
        }
    }

    /// Returns a point-in-time copy of the configuration.
    pub fn snapshot(&self) -> Config {
        self.read().clone()
    }

    /// Returns the current shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        self.read().shutdown_timeout
    }

    /// Returns the current advisory task ceiling.
    pub fn max_routines(&self) -> usize {
        self.read().max_routines
    }

    /// Subscribes to collector-interval changes.
    ///
    /// The receiver immediately holds the current interval and is notified
    /// on every later change, so a running collector can re-pace itself
    /// without re-reading the config lock.
    pub fn subscribe_interval(&self) -> watch::Receiver<Duration> {
        self.interval_tx.subscribe()
    }

    /// Validates and applies an update, returning the new snapshot.
    ///
    /// Interval changes (standalone or inside a `Metrics` update) are also
    /// pushed through the watch channel.
    pub fn apply(&self, update: ConfigUpdate) -> Result<Config, RuntimeError> {
        match update {
            ConfigUpdate::ShutdownTimeout(d) => {
                self.write().shutdown_timeout = d;
            }
            ConfigUpdate::Metrics {
                enabled,
                endpoint,
                interval,
            } => {
                if enabled && endpoint.is_empty() {
                    return Err(RuntimeError::BadConfig {
                        reason: "metrics endpoint must not be empty".into(),
                    });
                }
                if enabled && interval == Duration::ZERO {
                    return Err(RuntimeError::BadConfig {
                        reason: "metrics interval must be positive".into(),
                    });
                }
                {
                    let mut cfg = self.write();
                    cfg.metrics_enabled = enabled;
                    cfg.metrics_endpoint = endpoint;
                    cfg.update_interval = interval;
                }
                let _ = self.interval_tx.send(interval);
            }
            ConfigUpdate::MaxRoutines(n) => {
                self.write().max_routines = n;
            }
            ConfigUpdate::UpdateInterval(d) => {
                if d == Duration::ZERO {
                    return Err(RuntimeError::BadConfig {
                        reason: "update interval must be positive".into(),
                    });
                }
                self.write().update_interval = d;
                let _ = self.interval_tx.send(d);
            }
        }
        Ok(self.snapshot())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Config> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Config> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
