//! # Application manager: the middle tier.
//!
//! An [`AppManager`] owns a map of local managers and a cancellation
//! context derived from the root. Shutting it down fans out to its locals
//! (concurrently when graceful, sequentially when forced), then cancels the
//! app context and deregisters the app from the root.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::SharedConfig;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind, Level};
use crate::manager::local::LocalManager;
use crate::manager::root::RootManager;
use crate::manager::{read_lock, write_lock};

/// Per-application manager owning a map of local managers.
pub struct AppManager {
    name: String,
    token: CancellationToken,
    locals: RwLock<HashMap<String, Arc<LocalManager>>>,
    root: Weak<RootManager>,
    bus: Bus,
    config: SharedConfig,
}

impl AppManager {
    pub(crate) fn new(
        name: String,
        parent: &CancellationToken,
        root: Weak<RootManager>,
        bus: Bus,
        config: SharedConfig,
    ) -> Arc<Self> {
        let app = Arc::new(Self {
            name,
            token: parent.child_token(),
            locals: RwLock::new(HashMap::new()),
            root,
            bus,
            config,
        });
        app.bus.publish(app.event(EventKind::ManagerCreated));
        app
    }

    /// Returns this app's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a clone of this app's cancellation context.
    pub fn context(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns the local manager with this name, creating and registering
    /// it if absent. Idempotent: the same name always yields the same
    /// manager until it is shut down.
    pub fn local(self: &Arc<Self>, name: &str) -> Arc<LocalManager> {
        if let Some(existing) = read_lock(&self.locals).get(name) {
            return Arc::clone(existing);
        }
        let mut locals = write_lock(&self.locals);
        Arc::clone(locals.entry(name.to_string()).or_insert_with(|| {
            LocalManager::new(
                self.name.clone(),
                name.to_string(),
                &self.token,
                Arc::downgrade(self),
                self.bus.clone(),
                self.config.clone(),
            )
        }))
    }

    /// Looks up a registered local manager without creating it.
    pub fn get_local(&self, name: &str) -> Result<Arc<LocalManager>, RuntimeError> {
        let found = read_lock(&self.locals).get(name).cloned();
        match found {
            Some(local) => Ok(local),
            None => {
                let err = RuntimeError::LocalNotFound {
                    app: self.name.clone(),
                    local: name.to_string(),
                };
                self.bus.publish(
                    self.event(EventKind::OperationError)
                        .with_local(name)
                        .with_error(err.as_label()),
                );
                Err(err)
            }
        }
    }

    /// Returns the sorted names of the registered local managers.
    pub fn list_locals(&self) -> Vec<String> {
        let mut names: Vec<String> = read_lock(&self.locals).keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered local managers.
    pub fn count_locals(&self) -> usize {
        read_lock(&self.locals).len()
    }

    /// Returns the number of tracked tasks across all local managers.
    pub fn count_tasks(&self) -> usize {
        let locals: Vec<Arc<LocalManager>> = read_lock(&self.locals).values().cloned().collect();
        locals.iter().map(|local| local.count_tasks()).sum()
    }

    /// Shuts down every local manager, cancels the app context, and
    /// deregisters the app from the root.
    ///
    /// With `safe` the locals shut down concurrently and are joined before
    /// the app context is cancelled; without it they are forced
    /// sequentially and the context cancelled right after. Returns the
    /// total number of forcibly untracked tasks.
    pub async fn shutdown(&self, safe: bool) -> usize {
        self.bus.publish(self.event(EventKind::ManagerShutdown));

        let locals: Vec<Arc<LocalManager>> = read_lock(&self.locals).values().cloned().collect();

        let mut residual = 0usize;
        if safe {
            let mut joins = JoinSet::new();
            for local in locals {
                joins.spawn(async move { local.shutdown(true).await });
            }
            while let Some(joined) = joins.join_next().await {
                residual += joined.unwrap_or(0);
            }
        } else {
            for local in locals {
                residual += local.shutdown(false).await;
            }
        }

        self.token.cancel();
        if let Some(root) = self.root.upgrade() {
            root.remove_app(&self.name);
        }
        residual
    }

    pub(crate) fn remove_local(&self, name: &str) {
        write_lock(&self.locals).remove(name);
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::now(kind).with_level(Level::App).with_app(&self.name)
    }
}
