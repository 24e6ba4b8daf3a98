//! # Metrics pipeline: sink interface, counters, sampler, exposition.
//!
//! The tree reports through three cooperating pieces:
//!
//! - every manager publishes [`Event`](crate::Event)s on the bus; the root
//!   manager's event pump folds them into the [`MetricsRegistry`] and
//!   forwards them to the configured [`MetricsSink`];
//! - the collector samples live-tree gauges on the configured interval;
//! - the exposition server renders the registry over HTTP.
//!
//! Server and collector start and stop idempotently, driven by
//! `UpdateConfig(Metrics { .. })` on the root manager.

mod collector;
mod log;
mod registry;
mod server;
mod sink;

pub use log::LogWriter;
pub use registry::MetricsRegistry;
pub use sink::{MetricsSink, NoopSink};

pub(crate) use collector::{spawn_collector, CollectorHandle};
pub(crate) use server::MetricsServer;
