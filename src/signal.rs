//! # Cross-platform OS signal handling.
//!
//! Provides [`wait_for_shutdown_signal`], an async helper that completes
//! when the process receives a termination signal. The root manager's
//! signal trap awaits it and then runs a graceful tree shutdown; embedding
//! applications that install their own traps can await it directly.
//!
//! ## Signals
//! On unix the helper listens for `SIGINT`, `SIGTERM`, and `SIGQUIT` —
//! terminal interrupts, the default kill signal used by systemd and
//! Kubernetes, and the customary hard-stop request. Elsewhere it falls
//! back to [`tokio::signal::ctrl_c`].

/// Waits for a termination signal.
///
/// Each call registers its own listeners, so concurrent waiters are
/// independent. Returns `Ok(())` once any of the watched signals arrives,
/// or `Err` if listener registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut streams = [
        SignalKind::interrupt(),
        SignalKind::terminate(),
        SignalKind::quit(),
    ]
    .into_iter()
    .map(signal)
    .collect::<std::io::Result<Vec<_>>>()?;

    let arrivals = streams
        .iter_mut()
        .map(|stream| Box::pin(stream.recv()))
        .collect::<Vec<_>>();
    futures::future::select_all(arrivals).await;
    Ok(())
}

/// Waits for a termination signal.
///
/// Each call registers its own listener. Returns `Ok(())` once Ctrl-C
/// arrives, or `Err` if listener registration fails.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
