//! End-to-end shutdown isolation across a full tree.
//!
//! Each test builds 5 apps × 5 locals × 20 tasks (10 under the "worker"
//! function group, 10 under "processor"), all parked on their cancellation
//! context, then shuts down one scope and checks that exactly the right
//! tasks stopped and everything else kept running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tasktree::{Config, RootManager, TaskError};
use tokio::time::sleep;

type Counters = HashMap<(String, String), Arc<AtomicI32>>;

/// Spawns the 5 × 5 × 20 tree. Every worker bumps its (app, local) counter
/// once when it observes cancellation, so counters equal stopped tasks.
async fn build_tree(root: &Arc<RootManager>) -> Counters {
    let mut counters = Counters::new();
    for app_num in 1..=5 {
        let app = root.app(&format!("app{app_num}"));
        for local_num in 1..=5 {
            let local = app.local(&format!("local{local_num}"));
            let counter = Arc::new(AtomicI32::new(0));
            counters.insert(
                (app.name().to_string(), local.name().to_string()),
                Arc::clone(&counter),
            );
            for _ in 0..10 {
                for function in ["worker", "processor"] {
                    let counter = Arc::clone(&counter);
                    local.go_with_wait_group(function, move |ctx| async move {
                        loop {
                            tokio::select! {
                                _ = ctx.cancelled() => {
                                    counter.fetch_add(1, Ordering::SeqCst);
                                    return Err(TaskError::Canceled);
                                }
                                _ = sleep(Duration::from_millis(10)) => {}
                            }
                        }
                    });
                }
            }
        }
    }
    // Let the workers reach their select loops.
    sleep(Duration::from_millis(50)).await;
    counters
}

fn stopped(counters: &Counters, app: &str, local: &str) -> i32 {
    counters[&(app.to_string(), local.to_string())].load(Ordering::SeqCst)
}

fn total_stopped(counters: &Counters) -> i32 {
    counters.values().map(|c| c.load(Ordering::SeqCst)).sum()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn function_group_shutdown_is_isolated() {
    let root = RootManager::new(Config::default());
    let counters = build_tree(&root).await;
    assert_eq!(root.count_tasks(), 500);

    let local = root
        .get_app("app1")
        .expect("app1 registered")
        .get_local("local1")
        .expect("local1 registered");

    local
        .shutdown_function("worker", Duration::from_secs(2))
        .await
        .expect("workers honour cancellation");
    sleep(Duration::from_millis(100)).await;

    assert_eq!(stopped(&counters, "app1", "local1"), 10);
    assert_eq!(local.count_tasks(), 10);
    assert_eq!(local.count_tasks_by_function("worker"), 0);
    assert_eq!(local.count_tasks_by_function("processor"), 10);
    assert_eq!(root.count_tasks(), 490);

    for app_num in 1..=5 {
        for local_num in 1..=5 {
            if app_num == 1 && local_num == 1 {
                continue;
            }
            assert_eq!(
                stopped(&counters, &format!("app{app_num}"), &format!("local{local_num}")),
                0,
                "app{app_num}/local{local_num} must be unaffected"
            );
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn local_shutdown_stops_exactly_its_tasks() {
    let root = RootManager::new(Config::default());
    let counters = build_tree(&root).await;

    let app = root.get_app("app2").expect("app2 registered");
    let local = app.get_local("local3").expect("local3 registered");
    let ctx = local.context();

    let residual = local.shutdown(true).await;
    sleep(Duration::from_millis(100)).await;

    assert_eq!(residual, 0, "cooperative tasks never get orphaned");
    assert_eq!(stopped(&counters, "app2", "local3"), 20);
    assert_eq!(local.count_tasks(), 0);
    assert!(ctx.is_cancelled());
    assert_eq!(root.count_tasks(), 480);

    // The local deregistered itself from its app.
    assert!(app.get_local("local3").is_err());
    assert_eq!(app.count_locals(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn app_shutdown_stops_all_its_locals() {
    let root = RootManager::new(Config::default());
    let counters = build_tree(&root).await;

    let app = root.get_app("app3").expect("app3 registered");
    let ctx = app.context();
    let locals: Vec<_> = (1..=5)
        .map(|n| app.get_local(&format!("local{n}")).expect("local registered"))
        .collect();

    app.shutdown(true).await;
    sleep(Duration::from_millis(200)).await;

    let app3_stopped: i32 = (1..=5)
        .map(|n| stopped(&counters, "app3", &format!("local{n}")))
        .sum();
    assert_eq!(app3_stopped, 100);
    assert!(ctx.is_cancelled());
    for local in &locals {
        assert_eq!(local.count_tasks(), 0);
    }
    assert_eq!(root.count_tasks(), 400);

    // The app deregistered itself from the root.
    assert!(root.get_app("app3").is_err());
    assert_eq!(root.count_apps(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tree_shutdown_stops_everything() {
    let root = RootManager::new(Config::default());
    let counters = build_tree(&root).await;
    let ctx = root.context();

    let residual = root.shutdown_tree(true).await;
    sleep(Duration::from_millis(200)).await;

    assert_eq!(residual, 0);
    assert_eq!(total_stopped(&counters), 500);
    assert_eq!(root.count_tasks(), 0);
    assert_eq!(root.count_apps(), 0);
    assert!(ctx.is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn staged_shutdowns_compose() {
    let root = RootManager::new(Config::default());
    let counters = build_tree(&root).await;

    let local1 = root.app("app1").local("local1");
    local1
        .shutdown_function("worker", Duration::from_secs(2))
        .await
        .expect("workers stop in time");
    sleep(Duration::from_millis(100)).await;
    assert_eq!(stopped(&counters, "app1", "local1"), 10);

    root.app("app2").local("local2").shutdown(true).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(stopped(&counters, "app2", "local2"), 20);

    root.app("app4").shutdown(true).await;
    sleep(Duration::from_millis(200)).await;
    let app4_stopped: i32 = (1..=5)
        .map(|n| stopped(&counters, "app4", &format!("local{n}")))
        .sum();
    assert_eq!(app4_stopped, 100);

    root.shutdown_tree(true).await;
    sleep(Duration::from_millis(200)).await;
    assert_eq!(total_stopped(&counters), 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_is_idempotent() {
    let root = RootManager::new(Config::default());
    let local = root.app("once").local("jobs");
    local.go_with_wait_group("worker", |ctx| async move {
        ctx.cancelled().await;
        Ok(())
    });
    sleep(Duration::from_millis(20)).await;

    assert_eq!(local.shutdown(true).await, 0);
    assert_eq!(local.count_tasks(), 0);

    // Second call is a no-op on an already-shut manager.
    assert_eq!(local.shutdown(true).await, 0);
    assert_eq!(local.count_function_wait_groups(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsafe_tree_shutdown_cancels_descendant_contexts() {
    let root = RootManager::new(Config::default());
    let local = root.app("fast").local("jobs");
    let id = local.go(
        "worker",
        |ctx| async move {
            ctx.cancelled().await;
            Ok(())
        },
        [],
    );
    let task_ctx = local.task_context(&id).expect("task tracked");

    root.shutdown_tree(false).await;

    // Ancestor cancellation must reach the task context promptly.
    tokio::time::timeout(Duration::from_secs(1), task_ctx.cancelled())
        .await
        .expect("descendant context cancelled");
    assert_eq!(root.count_tasks(), 0);
}
