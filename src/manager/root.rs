//! # Root manager: the process-wide top of the hierarchy.
//!
//! A [`RootManager`] owns the map of app managers, the root cancellation
//! context every other context descends from, the shared configuration,
//! the event bus, and the metrics pipeline (registry, collector,
//! exposition server).
//!
//! Prefer the explicit [`RootManager::new`] constructor; it keeps tests
//! isolated and lets several trees coexist in one process.
//! [`RootManager::init`] is the singleton convenience over a default
//! instance and additionally installs the OS signal trap that triggers a
//! graceful tree shutdown.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigUpdate, SharedConfig};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind, Level};
use crate::manager::app::AppManager;
use crate::manager::{read_lock, write_lock};
use crate::metrics::{
    spawn_collector, CollectorHandle, MetricsRegistry, MetricsServer, MetricsSink, NoopSink,
};
use crate::signal;

/// The process-wide default instance behind [`RootManager::init`].
static DEFAULT_ROOT: OnceLock<Arc<RootManager>> = OnceLock::new();

/// Running metrics pieces, owned so start/stop stays idempotent.
#[derive(Default)]
struct MetricsRuntime {
    server: Option<MetricsServer>,
    collector: Option<CollectorHandle>,
}

/// Process-wide root of the manager tree.
pub struct RootManager {
    token: CancellationToken,
    apps: RwLock<HashMap<String, Arc<AppManager>>>,
    config: SharedConfig,
    bus: Bus,
    registry: Arc<MetricsRegistry>,
    sink: Arc<dyn MetricsSink>,
    metrics_runtime: Mutex<MetricsRuntime>,
    trap_installed: AtomicBool,
}

impl RootManager {
    /// Creates an independent root with a [`NoopSink`].
    ///
    /// Must be called from within a Tokio runtime (the event pump is
    /// spawned immediately). No signal trap is installed.
    pub fn new(cfg: Config) -> Arc<Self> {
        Self::with_sink(cfg, Arc::new(NoopSink))
    }

    /// Creates an independent root forwarding every lifecycle event to the
    /// given sink.
    pub fn with_sink(cfg: Config, sink: Arc<dyn MetricsSink>) -> Arc<Self> {
        let bus = Bus::new(cfg.bus_capacity);
        let root = Arc::new(Self {
            token: CancellationToken::new(),
            apps: RwLock::new(HashMap::new()),
            config: SharedConfig::new(cfg),
            bus,
            registry: Arc::new(MetricsRegistry::new()),
            sink,
            metrics_runtime: Mutex::new(MetricsRuntime::default()),
            trap_installed: AtomicBool::new(false),
        });
        root.spawn_event_pump();
        root.bus
            .publish(Event::now(EventKind::ManagerCreated).with_level(Level::Root));
        root
    }

    /// Returns the process-wide default root, creating it on first call,
    /// and installs the signal trap.
    ///
    /// Concurrent first calls race safely: the creation path runs at most
    /// once, and every caller observes the same instance. The trap listens
    /// for the customary termination signals and runs
    /// [`shutdown_tree(true)`](Self::shutdown_tree).
    pub fn init() -> Arc<Self> {
        let root = Arc::clone(DEFAULT_ROOT.get_or_init(|| Self::new(Config::default())));
        root.install_signal_trap();
        root
    }

    /// Installs the OS signal trap once; later calls are no-ops.
    pub fn install_signal_trap(self: &Arc<Self>) {
        if self.trap_installed.swap(true, Ordering::AcqRel) {
            return;
        }
        let root = Arc::clone(self);
        tokio::spawn(async move {
            if signal::wait_for_shutdown_signal().await.is_ok() {
                root.bus
                    .publish(Event::now(EventKind::ShutdownRequested).with_level(Level::Root));
                root.shutdown_tree(true).await;
            }
        });
    }

    /// Returns a clone of the root cancellation context.
    pub fn context(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns the app manager with this name, creating and registering it
    /// if absent. Registering an existing name returns the existing app.
    pub fn app(self: &Arc<Self>, name: &str) -> Arc<AppManager> {
        if let Some(existing) = read_lock(&self.apps).get(name) {
            return Arc::clone(existing);
        }
        let mut apps = write_lock(&self.apps);
        Arc::clone(apps.entry(name.to_string()).or_insert_with(|| {
            AppManager::new(
                name.to_string(),
                &self.token,
                Arc::downgrade(self),
                self.bus.clone(),
                self.config.clone(),
            )
        }))
    }

    /// Looks up a registered app without creating it.
    pub fn get_app(&self, name: &str) -> Result<Arc<AppManager>, RuntimeError> {
        let found = read_lock(&self.apps).get(name).cloned();
        match found {
            Some(app) => Ok(app),
            None => {
                let err = RuntimeError::AppNotFound {
                    name: name.to_string(),
                };
                self.bus.publish(
                    Event::now(EventKind::OperationError)
                        .with_level(Level::Root)
                        .with_app(name)
                        .with_error(err.as_label()),
                );
                Err(err)
            }
        }
    }

    /// Returns the sorted names of the registered apps.
    pub fn list_apps(&self) -> Vec<String> {
        let mut names: Vec<String> = read_lock(&self.apps).keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered apps.
    pub fn count_apps(&self) -> usize {
        read_lock(&self.apps).len()
    }

    /// Returns the number of local managers across all apps.
    pub fn count_locals(&self) -> usize {
        let apps: Vec<Arc<AppManager>> = read_lock(&self.apps).values().cloned().collect();
        apps.iter().map(|app| app.count_locals()).sum()
    }

    /// Returns the number of tracked tasks across the whole tree.
    pub fn count_tasks(&self) -> usize {
        let apps: Vec<Arc<AppManager>> = read_lock(&self.apps).values().cloned().collect();
        apps.iter().map(|app| app.count_tasks()).sum()
    }

    /// Shuts down the whole tree, then cancels the root context and stops
    /// the metrics pipeline.
    ///
    /// With `safe` every app shuts down concurrently and the call joins all
    /// of them before cancelling the root context; without it apps are
    /// forced sequentially and the context cancelled immediately after.
    /// App-level problems never abort the sweep. Returns the total number
    /// of forcibly untracked tasks.
    pub async fn shutdown_tree(&self, safe: bool) -> usize {
        self.bus
            .publish(Event::now(EventKind::ManagerShutdown).with_level(Level::Root));

        let apps: Vec<Arc<AppManager>> = read_lock(&self.apps).values().cloned().collect();

        let mut residual = 0usize;
        if safe {
            let mut joins = JoinSet::new();
            for app in apps {
                joins.spawn(async move { app.shutdown(true).await });
            }
            while let Some(joined) = joins.join_next().await {
                residual += joined.unwrap_or(0);
            }
        } else {
            for app in apps {
                residual += app.shutdown(false).await;
            }
        }

        self.token.cancel();

        let mut runtime = self.metrics_runtime.lock().await;
        if let Some(server) = runtime.server.take() {
            server.stop().await;
        }
        if let Some(collector) = runtime.collector.take() {
            collector.stop().await;
        }
        residual
    }

    /// Validates and applies a configuration update.
    ///
    /// A `Metrics` update also reconciles the exposition server and
    /// collector with the new state: enabling starts whichever piece is not
    /// yet running (never restarts a running one), disabling stops both.
    pub async fn update_config(self: &Arc<Self>, update: ConfigUpdate) -> Result<(), RuntimeError> {
        let touches_metrics = matches!(update, ConfigUpdate::Metrics { .. });
        let snapshot = self.config.apply(update)?;
        if touches_metrics {
            self.sync_metrics(&snapshot).await?;
        }
        self.bus
            .publish(Event::now(EventKind::ConfigUpdated).with_level(Level::Root));
        Ok(())
    }

    /// Returns a point-in-time copy of the configuration.
    pub fn config(&self) -> Config {
        self.config.snapshot()
    }

    /// Subscribes to the lifecycle event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Returns the counters registry backing the exposition endpoint.
    pub fn registry(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.registry)
    }

    /// Returns the bound address of the exposition server, if running.
    pub async fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_runtime
            .lock()
            .await
            .server
            .as_ref()
            .map(|server| server.addr())
    }

    pub(crate) fn remove_app(&self, name: &str) {
        write_lock(&self.apps).remove(name);
    }

    async fn sync_metrics(self: &Arc<Self>, cfg: &Config) -> Result<(), RuntimeError> {
        let mut runtime = self.metrics_runtime.lock().await;
        if cfg.metrics_enabled {
            if runtime.server.is_none() {
                runtime.server =
                    Some(MetricsServer::start(&cfg.metrics_endpoint, Arc::clone(&self.registry)).await?);
            }
            if runtime.collector.is_none() {
                runtime.collector = Some(spawn_collector(
                    Arc::clone(&self.registry),
                    Arc::downgrade(self),
                    self.config.subscribe_interval(),
                ));
            }
        } else {
            if let Some(server) = runtime.server.take() {
                server.stop().await;
            }
            if let Some(collector) = runtime.collector.take() {
                collector.stop().await;
            }
        }
        Ok(())
    }

    fn spawn_event_pump(&self) {
        let mut rx = self.bus.subscribe();
        let registry = Arc::clone(&self.registry);
        let sink = Arc::clone(&self.sink);
        let token = self.token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(ev) => {
                            registry.observe(&ev);
                            sink.handle(&ev).await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                        // A gap under burst load is acceptable for metrics.
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
        });
    }
}
