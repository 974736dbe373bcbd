//! Execution-context identities supplied by the host runtime.
//!
//! The container never asks the scheduler where it is running. Callers pass an
//! [`ExecutionContext`] into every resolution, naming the worker thread and the
//! task (if any) the request belongs to. Worker and task identities are
//! independent of each other.

use std::fmt;

/// Identity of a worker execution context (usually one OS thread)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u64);

/// Identity of a task execution context (one lightweight cooperative task)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// The context a resolution request is made from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ExecutionContext {
    worker: Option<WorkerId>,
    task: Option<TaskId>,
}

impl ExecutionContext {
    /// Outside any worker or task
    pub fn global() -> Self {
        Self::default()
    }

    /// Inside a worker, outside any task
    pub fn for_worker(worker: WorkerId) -> Self {
        Self {
            worker: Some(worker),
            task: None,
        }
    }

    /// Inside a task running on the given worker
    pub fn for_task(worker: WorkerId, task: TaskId) -> Self {
        Self {
            worker: Some(worker),
            task: Some(task),
        }
    }

    /// Inside a task with no known worker
    pub fn detached_task(task: TaskId) -> Self {
        Self {
            worker: None,
            task: Some(task),
        }
    }

    /// Replace the task identity
    pub fn with_task(mut self, task: Option<TaskId>) -> Self {
        self.task = task;
        self
    }

    /// Replace the worker identity
    pub fn with_worker(mut self, worker: Option<WorkerId>) -> Self {
        self.worker = worker;
        self
    }

    pub fn worker_id(&self) -> Option<WorkerId> {
        self.worker
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.task
    }

    pub fn in_worker(&self) -> bool {
        self.worker.is_some()
    }

    pub fn in_task(&self) -> bool {
        self.task.is_some()
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.worker, self.task) {
            (Some(worker), Some(task)) => write!(f, "{}/{}", worker, task),
            (Some(worker), None) => write!(f, "{}", worker),
            (None, Some(task)) => write!(f, "{}", task),
            (None, None) => write!(f, "global"),
        }
    }
}

/// Callback the host invokes once the context it was registered for has ended
pub type TeardownCallback = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle events exposed by the host runtime.
///
/// The container registers one teardown callback per worker or task the first
/// time it creates a cache for that context. The host must invoke the callback
/// exactly once, after the context has finished running.
pub trait ContextLifecycle: Send + Sync {
    /// Register a callback for the end of a worker context
    fn on_worker_exit(&self, worker: WorkerId, teardown: TeardownCallback);

    /// Register a callback for the end of a task context
    fn on_task_exit(&self, task: TaskId, teardown: TeardownCallback);
}
