//! # Interval gauge sampler.
//!
//! The collector periodically walks the manager tree and refreshes the
//! live-tree gauges (`apps`, `locals`, `tasks`) in the [`MetricsRegistry`].
//! Counter updates do not go through it; those are folded into the registry
//! by the root manager's event pump as events are published.
//!
//! The sampling interval is read from a [`watch`] channel, so a
//! `UpdateInterval` config change re-paces a running collector without a
//! restart. The collector holds only a [`Weak`] handle to the root: it
//! never keeps the tree alive and stops sampling once the root is gone.

use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;

use crate::manager::RootManager;
use crate::metrics::MetricsRegistry;

/// Handle to a running collector; stopping is idempotent at the call site
/// (the root keeps at most one handle).
pub(crate) struct CollectorHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl CollectorHandle {
    /// Signals the collector to stop and waits for it to exit.
    pub(crate) async fn stop(self) {
        self.token.cancel();
        let _ = self.join.await;
    }
}

/// Spawns the sampling loop.
pub(crate) fn spawn_collector(
    registry: Arc<MetricsRegistry>,
    root: Weak<RootManager>,
    mut interval_rx: watch::Receiver<Duration>,
) -> CollectorHandle {
    let token = CancellationToken::new();
    let loop_token = token.clone();

    let join = tokio::spawn(async move {
        loop {
            let interval = *interval_rx.borrow();
            let sleep = time::sleep(interval);
            tokio::pin!(sleep);

            tokio::select! {
                _ = loop_token.cancelled() => break,
                changed = interval_rx.changed() => {
                    // Re-pace immediately; a closed channel means the config
                    // handle is gone and the tree is being torn down.
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = &mut sleep => {}
            }

            match root.upgrade() {
                Some(root) => {
                    registry.set_live(root.count_apps(), root.count_locals(), root.count_tasks());
                }
                None => break,
            }
        }
    });

    CollectorHandle { token, join }
}
