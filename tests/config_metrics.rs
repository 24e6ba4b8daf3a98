//! Runtime configuration: typed updates, validation, the metrics pipeline
//! lifecycle (idempotent start/stop), and the singleton convenience.

use std::sync::Arc;
use std::time::Duration;

use tasktree::{Config, ConfigUpdate, RootManager, RuntimeError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

async fn scrape(addr: std::net::SocketAddr) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("endpoint reachable");
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nhost: test\r\n\r\n")
        .await
        .expect("request written");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("response read");
    response
}

#[tokio::test]
async fn shutdown_timeout_update_is_visible() {
    let root = RootManager::new(Config::default());
    assert_eq!(root.config().shutdown_timeout, Duration::from_secs(10));

    root.update_config(ConfigUpdate::ShutdownTimeout(Duration::from_millis(250)))
        .await
        .expect("valid update");
    assert_eq!(root.config().shutdown_timeout, Duration::from_millis(250));
}

#[tokio::test]
async fn max_routines_is_advisory() {
    let root = RootManager::new(Config::default());
    root.update_config(ConfigUpdate::MaxRoutines(1))
        .await
        .expect("valid update");

    let local = root.app("busy").local("jobs");
    // Spawning beyond the ceiling is observed, never rejected.
    for _ in 0..3 {
        local.go(
            "parked",
            |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            },
            [],
        );
    }
    sleep(Duration::from_millis(20)).await;
    assert_eq!(local.count_tasks(), 3);

    root.shutdown_tree(true).await;
}

#[tokio::test]
async fn bad_config_is_rejected_without_side_effects() {
    let root = RootManager::new(Config::default());

    let err = root
        .update_config(ConfigUpdate::Metrics {
            enabled: true,
            endpoint: String::new(),
            interval: Duration::from_secs(5),
        })
        .await
        .expect_err("empty endpoint");
    assert!(matches!(err, RuntimeError::BadConfig { .. }));

    let err = root
        .update_config(ConfigUpdate::UpdateInterval(Duration::ZERO))
        .await
        .expect_err("zero interval");
    assert!(matches!(err, RuntimeError::BadConfig { .. }));

    assert!(!root.config().metrics_enabled);
    assert!(root.metrics_addr().await.is_none());
}

#[tokio::test]
async fn enabling_metrics_twice_does_not_restart_the_server() {
    let root = RootManager::new(Config::default());

    let enable = ConfigUpdate::Metrics {
        enabled: true,
        endpoint: "127.0.0.1:0".into(),
        interval: Duration::from_millis(50),
    };
    root.update_config(enable.clone()).await.expect("first enable");
    let first_addr = root.metrics_addr().await.expect("server running");

    root.update_config(enable).await.expect("second enable");
    let second_addr = root.metrics_addr().await.expect("server still running");
    assert_eq!(first_addr, second_addr, "running server is left alone");

    // The endpoint serves the registry.
    let local = root.app("api").local("jobs");
    local.go("short", |_ctx| async move { Ok(()) }, []);
    sleep(Duration::from_millis(100)).await;

    let response = scrape(first_addr).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("tasktree_tasks_spawned_total"));
    assert!(response.contains("tasktree_live_tasks"));

    // Disabling stops the endpoint.
    root.update_config(ConfigUpdate::Metrics {
        enabled: false,
        endpoint: "127.0.0.1:0".into(),
        interval: Duration::from_millis(50),
    })
    .await
    .expect("disable");
    assert!(root.metrics_addr().await.is_none());
    assert!(TcpStream::connect(first_addr).await.is_err());

    root.shutdown_tree(true).await;
}

#[tokio::test]
async fn collector_samples_live_gauges() {
    let root = RootManager::new(Config::default());
    root.update_config(ConfigUpdate::Metrics {
        enabled: true,
        endpoint: "127.0.0.1:0".into(),
        interval: Duration::from_millis(20),
    })
    .await
    .expect("metrics on");

    let local = root.app("api").local("jobs");
    for _ in 0..4 {
        local.go(
            "parked",
            |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            },
            [],
        );
    }
    sleep(Duration::from_millis(120)).await;

    let addr = root.metrics_addr().await.expect("server running");
    let response = scrape(addr).await;
    assert!(response.contains("tasktree_live_tasks 4"));
    assert!(response.contains("tasktree_live_apps 1"));

    root.shutdown_tree(true).await;
}

#[tokio::test]
async fn init_returns_the_same_instance() {
    let first = RootManager::init();
    let second = RootManager::init();
    assert!(Arc::ptr_eq(&first, &second));

    let app = first.app("singleton-app");
    assert!(Arc::ptr_eq(&app, &second.app("singleton-app")));
}
