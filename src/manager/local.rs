//! # Local manager: the tier that owns tasks.
//!
//! A [`LocalManager`] tracks every task spawned through it in a map keyed by
//! stable id, joins them through an aggregate wait group, and optionally
//! through named per-function wait groups. Its cancellation context is a
//! child of the owning app's context, so cancelling any ancestor reaches
//! every task here.
//!
//! ## Spawn contract
//! [`go`](LocalManager::go) performs, in order:
//! 1. join the named function wait group (created lazily), if requested
//! 2. join the aggregate wait group
//! 3. derive the task context from the manager context
//! 4. allocate the tracking record
//! 5. insert the record into the map **before** the task can run
//! 6. hand the worker to the runtime
//! 7. attach a terminal cleanup block that runs on every exit path
//!    (return, error, panic) and reports, un-joins, closes the `done`
//!    latch, cancels, and untracks
//!
//! No task is ever visible in the map without a populated cancel handle,
//! and no wait group counts a task that will not later leave it.
//!
//! ## Shutdown
//! ```text
//! shutdown(true):  per-function graceful ─► aggregate wait (grace) ─► force
//! shutdown(false): cancel + untrack immediately
//! ```
//! Force means: cancel handles are invoked and the records untracked; the
//! underlying tasks are never killed. A task that ignores its context
//! becomes an orphan and is reported as such.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use futures::FutureExt;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::SharedConfig;
use crate::error::{RuntimeError, TaskError};
use crate::events::{Bus, Event, EventKind, Level};
use crate::manager::app::AppManager;
use crate::manager::routine::{Routine, RoutineId, TaskState};
use crate::manager::{read_lock, write_lock};
use crate::options::{GoOption, SpawnOptions};

/// Module-level manager owning a map of tracked tasks.
pub struct LocalManager {
    app_name: String,
    name: String,
    token: CancellationToken,
    routines: RwLock<HashMap<RoutineId, Arc<Routine>>>,
    function_wgs: RwLock<HashMap<String, TaskTracker>>,
    /// Aggregate wait group, joined once per spawned task.
    tracker: TaskTracker,
    /// Kept in lock-step with `routines.len()`; readable without the lock.
    routine_count: AtomicI64,
    app: Weak<AppManager>,
    bus: Bus,
    config: SharedConfig,
}

impl LocalManager {
    pub(crate) fn new(
        app_name: String,
        name: String,
        parent: &CancellationToken,
        app: Weak<AppManager>,
        bus: Bus,
        config: SharedConfig,
    ) -> Arc<Self> {
        let local = Arc::new(Self {
            app_name,
            name,
            token: parent.child_token(),
            routines: RwLock::new(HashMap::new()),
            function_wgs: RwLock::new(HashMap::new()),
            tracker: TaskTracker::new(),
            routine_count: AtomicI64::new(0),
            app,
            bus,
            config,
        });
        local.bus.publish(local.event(EventKind::ManagerCreated));
        local
    }

    /// Returns this manager's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning app's name.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Returns a clone of this manager's cancellation context.
    pub fn context(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawns a tracked task.
    ///
    /// The returned id is stable for the life of the process and can be
    /// used with the per-task helpers even after the task completed (which
    /// then report [`RuntimeError::TaskNotFound`]).
    ///
    /// The worker receives a context derived from this manager; it should
    /// watch it and return promptly once cancelled. A worker returning
    /// [`TaskError::Canceled`] is treated as a graceful exit.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// ## Example
    /// ```no_run
    /// # async fn demo(local: std::sync::Arc<tasktree::LocalManager>) {
    /// use tasktree::GoOption;
    ///
    /// let id = local.go(
    ///     "poller",
    ///     |ctx| async move {
    ///         ctx.cancelled().await;
    ///         Ok(())
    ///     },
    ///     [GoOption::Timeout(std::time::Duration::from_secs(60))],
    /// );
    /// # let _ = id;
    /// # }
    /// ```
    pub fn go<F, Fut>(
        self: &Arc<Self>,
        function_name: impl Into<String>,
        worker: F,
        opts: impl IntoIterator<Item = GoOption>,
    ) -> RoutineId
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let function_name = function_name.into();
        let opts = SpawnOptions::fold(opts);

        // Wait-group membership is taken before the task exists, so no
        // group ever misses a task it is supposed to join.
        let group_member = opts.wait_group.as_ref().map(|group| {
            write_lock(&self.function_wgs)
                .entry(group.clone())
                .or_insert_with(TaskTracker::new)
                .token()
        });
        let aggregate_member = self.tracker.token();

        let token = self.token.child_token();
        let routine = Arc::new(Routine::new(function_name.clone(), token.clone()));
        let id = routine.id().to_string();

        write_lock(&self.routines).insert(id.clone(), Arc::clone(&routine));
        self.routine_count.fetch_add(1, Ordering::AcqRel);

        self.bus.publish(
            self.event(EventKind::TaskSpawned)
                .with_function(&function_name)
                .with_task(&id),
        );

        let max = self.config.max_routines();
        if max > 0 && self.routine_count.load(Ordering::Relaxed) > max as i64 {
            self.bus.publish(
                self.event(EventKind::OperationError)
                    .with_function(&function_name)
                    .with_error("max_routines_exceeded"),
            );
        }

        let manager = Arc::clone(self);
        let task_id = id.clone();
        tokio::spawn(async move {
            routine.set_state(TaskState::Running);

            let worker_token = token.clone();
            let attempt = AssertUnwindSafe(async move { worker(worker_token).await }).catch_unwind();

            let outcome = match opts.timeout {
                Some(deadline) => match time::timeout(deadline, attempt).await {
                    Ok(result) => result,
                    Err(_elapsed) => {
                        token.cancel();
                        manager.bus.publish(
                            manager
                                .event(EventKind::TimeoutHit)
                                .with_function(&function_name)
                                .with_task(&task_id)
                                .with_timeout(deadline),
                        );
                        Ok(Err(TaskError::Timeout { timeout: deadline }))
                    }
                },
                None => attempt.await,
            };

            routine.set_state(TaskState::Terminating);

            let mut propagate = None;
            match outcome {
                Ok(Ok(())) | Ok(Err(TaskError::Canceled)) => {}
                Ok(Err(err)) => {
                    manager.bus.publish(
                        manager
                            .event(EventKind::TaskFailed)
                            .with_function(&function_name)
                            .with_task(&task_id)
                            .with_error(err.to_string()),
                    );
                }
                Err(payload) => {
                    manager.bus.publish(
                        manager
                            .event(EventKind::TaskPanicked)
                            .with_function(&function_name)
                            .with_task(&task_id)
                            .with_error(panic_message(payload.as_ref())),
                    );
                    if !opts.panic_recovery {
                        propagate = Some(payload);
                    }
                }
            }

            manager.bus.publish(
                manager
                    .event(EventKind::TaskCompleted)
                    .with_function(&function_name)
                    .with_task(&task_id)
                    .with_duration(routine.uptime()),
            );

            drop(group_member);
            if let Some(group) = opts.wait_group.as_ref() {
                // Last member out removes the group, so an idle manager
                // holds no empty wait groups.
                let mut wgs = write_lock(&manager.function_wgs);
                if wgs.get(group).is_some_and(|tracker| tracker.is_empty()) {
                    wgs.remove(group);
                }
            }
            drop(aggregate_member);
            routine.finish();
            token.cancel();
            if write_lock(&manager.routines).remove(&task_id).is_some() {
                manager.routine_count.fetch_sub(1, Ordering::AcqRel);
            }
            routine.set_state(TaskState::Terminated);

            if let Some(payload) = propagate {
                std::panic::resume_unwind(payload);
            }
        });

        id
    }

    /// Spawns a tracked task that also joins the wait group named after its
    /// function, so [`shutdown_function`](Self::shutdown_function) can join
    /// the whole group.
    pub fn go_with_wait_group<F, Fut>(
        self: &Arc<Self>,
        function_name: impl Into<String>,
        worker: F,
    ) -> RoutineId
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let function_name = function_name.into();
        let group = GoOption::WaitGroupName(function_name.clone());
        self.go(function_name, worker, [group])
    }

    /// Gracefully stops every live task with this function name.
    ///
    /// Cancels their contexts, then waits up to `timeout` for every one of
    /// them — and the function wait group, if present — to finish. On
    /// success the function wait group is removed and `Ok(())` returned. On timeout the collected tasks are untracked (their
    /// workers may still be running — they become orphans), the wait group
    /// is removed, and [`RuntimeError::FunctionTimeout`] is returned.
    ///
    /// This is the only operation that deliberately orphans tasks: when
    /// user code does not honour cancellation, accounting consistency wins
    /// over waiting forever.
    pub async fn shutdown_function(
        &self,
        function: &str,
        timeout: Duration,
    ) -> Result<(), RuntimeError> {
        let targets: Vec<Arc<Routine>> = read_lock(&self.routines)
            .values()
            .filter(|r| r.function_name() == function)
            .cloned()
            .collect();

        for routine in &targets {
            routine.cancel();
        }

        // Every collected task is joined through its completion latch; the
        // wait group alone is not enough, since a same-named task spawned
        // without membership would otherwise slip through a drained group.
        let group = read_lock(&self.function_wgs).get(function).cloned();
        if let Some(group) = &group {
            group.close();
        }
        let latches: Vec<CancellationToken> = targets.iter().map(|r| r.done_token()).collect();
        let drained = time::timeout(timeout, async move {
            for latch in latches {
                latch.cancelled().await;
            }
            if let Some(group) = group {
                group.wait().await;
            }
        })
        .await
        .is_ok();

        if !drained {
            let mut removed: i64 = 0;
            {
                let mut routines = write_lock(&self.routines);
                for routine in &targets {
                    if routines.remove(routine.id()).is_some() {
                        removed += 1;
                    }
                }
            }
            if removed > 0 {
                self.routine_count.fetch_sub(removed, Ordering::AcqRel);
            }
            write_lock(&self.function_wgs).remove(function);

            self.bus.publish(
                self.event(EventKind::FunctionShutdownTimeout)
                    .with_function(function)
                    .with_timeout(timeout),
            );
            self.bus.publish(
                self.event(EventKind::OrphanedTasks)
                    .with_function(function)
                    .with_count(removed as usize),
            );

            return Err(RuntimeError::FunctionTimeout {
                function: function.to_string(),
                timeout,
            });
        }

        write_lock(&self.function_wgs).remove(function);
        Ok(())
    }

    /// Shuts down every task of this manager and cancels its context.
    ///
    /// With `safe` the shutdown is staged: per-function graceful stops,
    /// then a grace-bounded wait on the aggregate wait group, then forced
    /// untracking of whatever is left. Without `safe` everything is
    /// cancelled and untracked immediately.
    ///
    /// Returns the number of tasks that had to be forcibly untracked
    /// (0 on a fully graceful shutdown). A second call on an already-shut
    /// manager is a no-op. Never fails: child timeouts are reported through
    /// events and metrics only.
    pub async fn shutdown(&self, safe: bool) -> usize {
        self.bus.publish(self.event(EventKind::ManagerShutdown));

        // Dropped on every exit path, so the wait-group map is empty by the
        // time this returns even if a wait panics.
        let _wg_cleanup = FunctionWgCleanup {
            wgs: &self.function_wgs,
        };

        let residual = if safe {
            self.shutdown_graceful().await
        } else {
            self.shutdown_force()
        };

        self.token.cancel();
        if let Some(app) = self.app.upgrade() {
            app.remove_local(&self.name);
        }
        residual
    }

    async fn shutdown_graceful(&self) -> usize {
        let started = time::Instant::now();
        let grace = self.config.shutdown_timeout();

        let functions: Vec<String> = {
            let routines = read_lock(&self.routines);
            let mut names: Vec<String> = routines
                .values()
                .map(|r| r.function_name().to_string())
                .collect();
            names.sort_unstable();
            names.dedup();
            names
        };

        for function in &functions {
            // Per-function timeouts are swallowed; the aggregate stage
            // below settles whatever is left.
            let _ = self.shutdown_function(function, grace).await;
        }

        self.tracker.close();
        if time::timeout(grace, self.tracker.wait()).await.is_ok() {
            self.bus.publish(
                self.event(EventKind::AllStoppedWithin)
                    .with_duration(started.elapsed()),
            );
            return 0;
        }

        self.bus.publish(
            self.event(EventKind::GraceExceeded)
                .with_timeout(grace)
                .with_duration(started.elapsed()),
        );
        let residual = self.shutdown_force();
        if residual > 0 {
            self.bus
                .publish(self.event(EventKind::OrphanedTasks).with_count(residual));
        }
        residual
    }

    /// Cancels every tracked task and removes it from the map, without
    /// waiting for anything.
    fn shutdown_force(&self) -> usize {
        let targets: Vec<Arc<Routine>> = read_lock(&self.routines).values().cloned().collect();
        for routine in &targets {
            routine.cancel();
        }

        let mut removed: i64 = 0;
        {
            let mut routines = write_lock(&self.routines);
            for routine in &targets {
                if routines.remove(routine.id()).is_some() {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            self.routine_count.fetch_sub(removed, Ordering::AcqRel);
        }
        removed as usize
    }

    /// Returns the number of tracked tasks.
    ///
    /// Reads the atomic counter; a negative value means the bookkeeping was
    /// corrupted, in which case the count is reconciled against the map
    /// under the write lock and the incident reported.
    pub fn count_tasks(&self) -> usize {
        let count = self.routine_count.load(Ordering::Acquire);
        if count < 0 {
            let routines = write_lock(&self.routines);
            let len = routines.len();
            self.routine_count.store(len as i64, Ordering::Release);
            drop(routines);
            self.bus.publish(
                self.event(EventKind::InvariantViolation)
                    .with_error(format!("negative task count {count}")),
            );
            return len;
        }
        count as usize
    }

    /// Returns the number of live function wait groups.
    pub fn count_function_wait_groups(&self) -> usize {
        read_lock(&self.function_wgs).len()
    }

    /// Returns the number of live tasks carrying this function name.
    pub fn count_tasks_by_function(&self, function: &str) -> usize {
        read_lock(&self.routines)
            .values()
            .filter(|r| r.function_name() == function)
            .count()
    }

    /// Returns a snapshot of all tracked tasks.
    pub fn list_tasks(&self) -> Vec<Arc<Routine>> {
        read_lock(&self.routines).values().cloned().collect()
    }

    /// Returns a snapshot of the tracked tasks with this function name.
    pub fn list_tasks_by_function(&self, function: &str) -> Vec<Arc<Routine>> {
        read_lock(&self.routines)
            .values()
            .filter(|r| r.function_name() == function)
            .cloned()
            .collect()
    }

    /// Looks up a tracked task by id.
    pub fn get_task(&self, id: &str) -> Result<Arc<Routine>, RuntimeError> {
        read_lock(&self.routines)
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::TaskNotFound { id: id.to_string() })
    }

    /// Returns a clone of a task's cancellation context.
    pub fn task_context(&self, id: &str) -> Result<CancellationToken, RuntimeError> {
        Ok(self.get_task(id)?.context())
    }

    /// Returns whether a task's cleanup has run.
    pub fn is_done(&self, id: &str) -> Result<bool, RuntimeError> {
        Ok(self.get_task(id)?.is_done())
    }

    /// Waits up to `timeout` for a task's completion latch.
    pub async fn wait_for(&self, id: &str, timeout: Duration) -> Result<(), RuntimeError> {
        let latch = self.get_task(id)?.done_token();
        time::timeout(timeout, latch.cancelled())
            .await
            .map_err(|_| RuntimeError::WaitTimeout {
                id: id.to_string(),
                timeout,
            })
    }

    /// Returns how long a task has been tracked.
    pub fn uptime(&self, id: &str) -> Result<Duration, RuntimeError> {
        Ok(self.get_task(id)?.uptime())
    }

    /// Cancels one task's context. The task stays tracked until its own
    /// cleanup removes it.
    pub fn cancel_task(&self, id: &str) -> Result<(), RuntimeError> {
        let routine = self.get_task(id)?;
        routine.cancel();
        Ok(())
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::now(kind)
            .with_level(Level::Local)
            .with_app(&self.app_name)
            .with_local(&self.name)
    }
}

/// Empties the function wait-group map when dropped.
struct FunctionWgCleanup<'a> {
    wgs: &'a RwLock<HashMap<String, TaskTracker>>,
}

impl Drop for FunctionWgCleanup<'_> {
    fn drop(&mut self) {
        write_lock(self.wgs).clear();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
