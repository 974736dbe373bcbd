//! Tokio adapter: carries an [`ExecutionContext`] in task-local storage and
//! tears task scopes down when the task finishes, fails or is aborted.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::container::{
    Container, ContextLifecycle, ExecutionContext, Instance, TaskId, TeardownCallback, WorkerId,
};
use crate::errors::CoreError;

tokio::task_local! {
    static CURRENT: ExecutionContext;
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique task identity
pub fn next_task_id() -> TaskId {
    TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
}

/// Allocate a process-unique worker identity
pub fn next_worker_id() -> WorkerId {
    WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
}

/// Context of the running scoped task, or the global context outside one
pub fn current_context() -> ExecutionContext {
    CURRENT.try_with(|ctx| *ctx).unwrap_or_default()
}

/// Resolve `id` from the current task's context
pub fn resolve_current(container: &Container, id: &str) -> Result<Instance, CoreError> {
    container.get(&current_context(), id)
}

struct TaskTeardown {
    container: Container,
    task: TaskId,
}

impl Drop for TaskTeardown {
    fn drop(&mut self) {
        if let Some(report) = self.container.teardown_task(self.task) {
            if !report.is_clean() {
                warn!(task = %self.task, failures = report.failures.len(), "task teardown finished with disposal failures");
            }
            debug!(%report, "task scope released");
        }
    }
}

/// Run `fut` as a fresh task context and tear its scope down afterwards
pub async fn run_scoped<F>(container: Container, worker: Option<WorkerId>, fut: F) -> F::Output
where
    F: Future,
{
    let task = next_task_id();
    let ctx = ExecutionContext::global()
        .with_worker(worker)
        .with_task(Some(task));
    let _teardown = TaskTeardown { container, task };

    CURRENT.scope(ctx, fut).await
}

/// Spawn `fut` on the tokio runtime as a fresh task context
pub fn spawn_scoped<F>(container: Container, worker: Option<WorkerId>, fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(run_scoped(container, worker, fut))
}

/// Owns a worker context; its scope is torn down when the guard drops
pub struct WorkerScopeGuard {
    container: Container,
    worker: WorkerId,
}

impl WorkerScopeGuard {
    pub fn new(container: Container, worker: WorkerId) -> Self {
        Self { container, worker }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::for_worker(self.worker)
    }

    /// Spawn a task bound to this worker
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        spawn_scoped(self.container.clone(), Some(self.worker), fut)
    }
}

impl Drop for WorkerScopeGuard {
    fn drop(&mut self) {
        if let Some(report) = self.container.teardown_worker(self.worker) {
            debug!(%report, "worker scope released");
        }
    }
}

/// Host-side registry of exit callbacks.
///
/// The container registers callbacks here when it first caches something for
/// a worker or task; the host calls [`ExitHooks::task_exited`] or
/// [`ExitHooks::worker_exited`] once the context is gone.
#[derive(Default)]
pub struct ExitHooks {
    workers: Mutex<HashMap<WorkerId, Vec<TeardownCallback>>>,
    tasks: Mutex<HashMap<TaskId, Vec<TeardownCallback>>>,
}

impl ExitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run and forget every callback registered for `task`
    pub fn task_exited(&self, task: TaskId) -> usize {
        let callbacks = self.tasks.lock().remove(&task).unwrap_or_default();
        run_callbacks(callbacks)
    }

    /// Run and forget every callback registered for `worker`
    pub fn worker_exited(&self, worker: WorkerId) -> usize {
        let callbacks = self.workers.lock().remove(&worker).unwrap_or_default();
        run_callbacks(callbacks)
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn pending_workers(&self) -> usize {
        self.workers.lock().len()
    }
}

fn run_callbacks(callbacks: Vec<TeardownCallback>) -> usize {
    let count = callbacks.len();
    for callback in callbacks {
        callback();
    }
    count
}

impl ContextLifecycle for ExitHooks {
    fn on_worker_exit(&self, worker: WorkerId, teardown: TeardownCallback) {
        self.workers.lock().entry(worker).or_default().push(teardown);
    }

    fn on_task_exit(&self, task: TaskId, teardown: TeardownCallback) {
        self.tasks.lock().entry(task).or_default().push(teardown);
    }
}
