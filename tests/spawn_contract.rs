//! The spawn/cleanup contract: tracking order, terminal cleanup on every
//! exit path, panic recovery, per-task deadlines, and orphaning of
//! unresponsive tasks.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tasktree::{Config, EventKind, GoOption, RootManager, RoutineId, RuntimeError, TaskError};
use tokio::time::{sleep, timeout, Instant};

/// Polls until the local manager is quiescent or the deadline passes.
async fn wait_quiescent(local: &Arc<tasktree::LocalManager>, deadline: Duration) {
    let started = Instant::now();
    while local.count_tasks() != 0 {
        assert!(
            started.elapsed() < deadline,
            "tasks still tracked after {deadline:?}"
        );
        sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn task_is_tracked_before_it_runs() {
    let root = RootManager::new(Config::default());
    let local = root.app("api").local("handlers");

    let seen = Arc::new(AtomicUsize::new(usize::MAX));
    let probe = Arc::clone(&seen);
    let manager = Arc::clone(&local);
    local.go(
        "probe",
        move |_ctx| async move {
            probe.store(manager.count_tasks(), Ordering::SeqCst);
            Ok(())
        },
        [],
    );

    let started = Instant::now();
    while seen.load(Ordering::SeqCst) == usize::MAX {
        assert!(started.elapsed() < Duration::from_secs(2));
        sleep(Duration::from_millis(5)).await;
    }
    // The record was in the map before the worker's first instruction.
    assert!(seen.load(Ordering::SeqCst) >= 1);

    wait_quiescent(&local, Duration::from_secs(2)).await;
    assert!(local.list_tasks().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ids_are_stable_and_unique() {
    let root = RootManager::new(Config::default());
    let local = root.app("api").local("handlers");

    let mut ids: Vec<RoutineId> = Vec::new();
    for _ in 0..20 {
        ids.push(local.go(
            "short",
            |_ctx| async move { Ok(()) },
            [],
        ));
    }
    for id in &ids {
        assert_eq!(id.len(), 22);
    }
    let mut deduped = ids.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), ids.len());

    wait_quiescent(&local, Duration::from_secs(2)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn per_task_helpers_operate_on_live_records() {
    let root = RootManager::new(Config::default());
    let local = root.app("api").local("handlers");

    let id = local.go(
        "parked",
        |ctx| async move {
            ctx.cancelled().await;
            Ok(())
        },
        [],
    );
    sleep(Duration::from_millis(20)).await;

    assert!(!local.is_done(&id).expect("task tracked"));
    assert!(local.uptime(&id).expect("task tracked") > Duration::ZERO);
    assert!(!local.task_context(&id).expect("task tracked").is_cancelled());

    local.cancel_task(&id).expect("task tracked");
    local
        .wait_for(&id, Duration::from_secs(1))
        .await
        .expect("cancelled task finishes");

    wait_quiescent(&local, Duration::from_secs(2)).await;
    // Lookups after cleanup report NotFound; that's expected racy behaviour.
    assert!(matches!(
        local.get_task(&id),
        Err(RuntimeError::TaskNotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_for_times_out_on_a_running_task() {
    let root = RootManager::new(Config::default());
    let local = root.app("api").local("handlers");

    let id = local.go(
        "parked",
        |ctx| async move {
            ctx.cancelled().await;
            Ok(())
        },
        [],
    );
    sleep(Duration::from_millis(10)).await;

    let err = local
        .wait_for(&id, Duration::from_millis(50))
        .await
        .expect_err("task is still parked");
    assert!(matches!(err, RuntimeError::WaitTimeout { .. }));

    local.shutdown(true).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_option_bounds_the_task() {
    let root = RootManager::new(Config::default());
    let local = root.app("api").local("handlers");
    let mut events = root.subscribe();

    let started = Instant::now();
    let id = local.go(
        "slow",
        |_ctx| async move {
            sleep(Duration::from_secs(30)).await;
            Ok(())
        },
        [GoOption::Timeout(Duration::from_millis(80))],
    );

    local
        .wait_for(&id, Duration::from_secs(2))
        .await
        .expect("deadline fires well before the sleep ends");
    assert!(started.elapsed() < Duration::from_secs(2));

    let hit = timeout(Duration::from_secs(1), async {
        loop {
            let ev = events.recv().await.expect("bus open");
            if ev.kind == EventKind::TimeoutHit {
                return ev;
            }
        }
    })
    .await
    .expect("timeout event published");
    assert_eq!(hit.function.as_deref(), Some("slow"));

    wait_quiescent(&local, Duration::from_secs(2)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_worker_is_cleaned_up_and_reported() {
    let root = RootManager::new(Config::default());
    let local = root.app("api").local("handlers");
    let mut events = root.subscribe();

    local.go(
        "boom",
        |_ctx| async move {
            let explode = true;
            if explode {
                panic!("kaboom");
            }
            Ok(())
        },
        [],
    );

    let panicked = timeout(Duration::from_secs(2), async {
        loop {
            let ev = events.recv().await.expect("bus open");
            if ev.kind == EventKind::TaskPanicked {
                return ev;
            }
        }
    })
    .await
    .expect("panic event published");
    assert_eq!(panicked.error.as_deref(), Some("kaboom"));

    wait_quiescent(&local, Duration::from_secs(2)).await;
    sleep(Duration::from_millis(20)).await;
    assert!(root.registry().panicked_total() >= 1);

    // The manager keeps working after a recovered panic.
    let id = local.go("after", |_ctx| async move { Ok(()) }, []);
    assert_eq!(id.len(), 22);
    wait_quiescent(&local, Duration::from_secs(2)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_panic_recovery_still_runs_cleanup() {
    let root = RootManager::new(Config::default());
    let local = root.app("api").local("handlers");

    local.go(
        "boom",
        |_ctx| async move {
            let explode = true;
            if explode {
                panic!("kaboom");
            }
            Ok(())
        },
        [GoOption::PanicRecovery(false)],
    );

    // The panic propagates into the runtime's task, but the deferred
    // cleanup has already untracked the record.
    wait_quiescent(&local, Duration::from_secs(2)).await;
    assert_eq!(local.count_function_wait_groups(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_worker_reports_and_untracks() {
    let root = RootManager::new(Config::default());
    let local = root.app("api").local("handlers");
    let mut events = root.subscribe();

    local.go(
        "flaky",
        |_ctx| async move {
            Err(TaskError::Fail {
                reason: "connection refused".into(),
            })
        },
        [],
    );

    let failed = timeout(Duration::from_secs(2), async {
        loop {
            let ev = events.recv().await.expect("bus open");
            if ev.kind == EventKind::TaskFailed {
                return ev;
            }
        }
    })
    .await
    .expect("failure event published");
    assert!(failed.error.as_deref().unwrap_or("").contains("refused"));

    wait_quiescent(&local, Duration::from_secs(2)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unresponsive_task_is_orphaned_not_waited_for() {
    let mut cfg = Config::default();
    cfg.shutdown_timeout = Duration::from_millis(100);
    let root = RootManager::new(cfg);
    let local = root.app("stuck").local("spinners");

    let beats = Arc::new(AtomicU64::new(0));
    let heart = Arc::clone(&beats);
    local.go(
        "spin",
        move |_ctx| async move {
            // Ignores its context entirely.
            for _ in 0..100_000 {
                sleep(Duration::from_millis(5)).await;
                heart.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        },
        [],
    );
    sleep(Duration::from_millis(30)).await;

    let started = Instant::now();
    local.shutdown(true).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(100), "grace was waited");
    assert!(elapsed < Duration::from_secs(2), "shutdown never hangs");
    assert_eq!(local.count_tasks(), 0);
    assert!(local.list_tasks().is_empty());

    sleep(Duration::from_millis(50)).await;
    assert!(root.registry().orphaned_total() >= 1);

    // The orphan is still alive, confirmed through its side channel.
    let before = beats.load(Ordering::SeqCst);
    sleep(Duration::from_millis(60)).await;
    assert!(beats.load(Ordering::SeqCst) > before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_timeout_function_shutdown_reports_orphans_immediately() {
    let root = RootManager::new(Config::default());
    let local = root.app("stuck").local("spinners");

    // Zero tasks: returns immediately with success.
    assert!(local
        .shutdown_function("worker", Duration::ZERO)
        .await
        .is_ok());

    local.go_with_wait_group("worker", |ctx| async move {
        ctx.cancelled().await;
        // Delay after cancellation so the zero-deadline wait cannot win.
        sleep(Duration::from_millis(200)).await;
        Ok(())
    });
    sleep(Duration::from_millis(20)).await;

    let err = local
        .shutdown_function("worker", Duration::ZERO)
        .await
        .expect_err("zero deadline with a live task");
    assert!(matches!(err, RuntimeError::FunctionTimeout { .. }));
    assert_eq!(local.count_tasks(), 0);
    assert_eq!(local.count_function_wait_groups(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn function_shutdown_joins_tasks_outside_the_wait_group() {
    let root = RootManager::new(Config::default());
    let local = root.app("mixed").local("jobs");

    // One member of the "worker" wait group, plus a same-named task that
    // never joined it and is slow to stop.
    local.go_with_wait_group("worker", |ctx| async move {
        ctx.cancelled().await;
        Ok(())
    });
    local.go(
        "worker",
        |_ctx| async move {
            sleep(Duration::from_millis(500)).await;
            Ok(())
        },
        [],
    );
    sleep(Duration::from_millis(20)).await;

    // The group drains instantly; the outsider must still count.
    let err = local
        .shutdown_function("worker", Duration::from_millis(100))
        .await
        .expect_err("straggler outside the group must not be masked");
    assert!(matches!(err, RuntimeError::FunctionTimeout { .. }));
    assert_eq!(local.count_tasks_by_function("worker"), 0);
    assert_eq!(local.count_tasks(), 0);
    assert_eq!(local.count_function_wait_groups(), 0);

    // With every task cooperating, the mixed set drains within the bound.
    local.go_with_wait_group("worker", |ctx| async move {
        ctx.cancelled().await;
        Ok(())
    });
    local.go(
        "worker",
        |ctx| async move {
            ctx.cancelled().await;
            Ok(())
        },
        [],
    );
    sleep(Duration::from_millis(20)).await;

    local
        .shutdown_function("worker", Duration::from_secs(2))
        .await
        .expect("both tasks honour cancellation");
    sleep(Duration::from_millis(50)).await;
    assert_eq!(local.count_tasks_by_function("worker"), 0);
    assert_eq!(local.count_tasks(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quiescence_leaves_no_tracking_residue() {
    let root = RootManager::new(Config::default());
    let local = root.app("burst").local("jobs");

    for n in 0..50 {
        if n % 2 == 0 {
            local.go_with_wait_group("even", |_ctx| async move {
                sleep(Duration::from_millis(2)).await;
                Ok(())
            });
        } else {
            local.go(
                "odd",
                |_ctx| async move {
                    sleep(Duration::from_millis(2)).await;
                    Ok(())
                },
                [],
            );
        }
    }

    wait_quiescent(&local, Duration::from_secs(5)).await;
    assert!(local.list_tasks().is_empty());
    assert_eq!(local.count_function_wait_groups(), 0);
    assert_eq!(local.count_tasks_by_function("even"), 0);
}
