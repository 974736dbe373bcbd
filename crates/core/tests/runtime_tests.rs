//! Tests for the tokio runtime adapter

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tessera_core::container::{ClassDescriptor, DefinitionTable, TypeRegistry};
use tessera_core::runtime::next_worker_id;
use tessera_core::{
    current_context, resolve_current, spawn_scoped, Container, CoreError, Dispose, WorkerScopeGuard,
};
use tokio::sync::oneshot;

struct Handle {
    released: Arc<Mutex<usize>>,
}

impl Dispose for Handle {
    fn dispose(&self) -> Result<(), CoreError> {
        *self.released.lock() += 1;
        Ok(())
    }
}

fn container(released: Arc<Mutex<usize>>) -> Container {
    let mut types = TypeRegistry::new();
    types
        .register(ClassDescriptor::concrete("Settings").factory(|_| Ok(())))
        .unwrap();
    types
        .register(
            ClassDescriptor::concrete("Handle")
                .task_scoped()
                .factory(move |_| {
                    Ok(Handle {
                        released: released.clone(),
                    })
                })
                .disposable::<Handle>(),
        )
        .unwrap();
    types
        .register(ClassDescriptor::concrete("Pool").worker_scoped().factory(|_| Ok(())))
        .unwrap();
    types
        .register(ClassDescriptor::concrete("SlowPool").worker_scoped().factory(|_| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(())
        }))
        .unwrap();

    let table = DefinitionTable::from_value(json!({
        "settings": {"class": "Settings"},
        "handle": {"class": "Handle"},
        "pool": {"class": "Pool"},
        "slow_pool": {"class": "SlowPool"}
    }))
    .unwrap();
    Container::new(table, types)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_spawned_tasks_get_their_own_task_scope() {
    let released = Arc::new(Mutex::new(0));
    let container = container(released.clone());

    let spawn = |container: Container| {
        let inner = container.clone();
        spawn_scoped(container, None, async move {
            let ctx = current_context();
            assert!(ctx.in_task());
            let settings = resolve_current(&inner, "settings").unwrap();
            let handle = resolve_current(&inner, "handle").unwrap();
            (settings, handle)
        })
    };

    let first = spawn(container.clone()).await.unwrap();
    let second = spawn(container.clone()).await.unwrap();

    assert!(first.0.ptr_eq(&second.0));
    assert!(!first.1.ptr_eq(&second.1));
    assert!(container.active_tasks().is_empty());
    assert_eq!(*released.lock(), 2);
}

#[tokio::test]
async fn test_aborted_task_is_torn_down() {
    let released = Arc::new(Mutex::new(0));
    let container = container(released.clone());
    let (ready_tx, ready_rx) = oneshot::channel();

    let inner = container.clone();
    let task = spawn_scoped(container.clone(), None, async move {
        resolve_current(&inner, "handle").unwrap();
        let _ = ready_tx.send(());
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    ready_rx.await.unwrap();
    assert_eq!(container.active_tasks().len(), 1);

    task.abort();
    let err = task.await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(container.active_tasks().is_empty());
    assert_eq!(*released.lock(), 1);
}

#[tokio::test]
async fn test_panicking_task_is_torn_down() {
    let released = Arc::new(Mutex::new(0));
    let container = container(released.clone());

    let inner = container.clone();
    let task = spawn_scoped(container.clone(), None, async move {
        resolve_current(&inner, "handle").unwrap();
        panic!("request handler failed");
    });

    assert!(task.await.unwrap_err().is_panic());
    assert!(container.active_tasks().is_empty());
    assert_eq!(*released.lock(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_guard_shares_and_releases_worker_scope() {
    let container = container(Arc::new(Mutex::new(0)));
    let guard = WorkerScopeGuard::new(container.clone(), next_worker_id());

    let spawn_pool = || {
        let inner = container.clone();
        guard.spawn(async move { resolve_current(&inner, "pool").unwrap() })
    };
    let a = spawn_pool().await.unwrap();
    let b = spawn_pool().await.unwrap();

    assert!(a.ptr_eq(&b));
    assert_eq!(container.active_workers(), vec![guard.worker()]);
    assert!(container.is_instantiated(&guard.context(), "pool"));

    drop(guard);
    assert!(container.active_workers().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_tasks_resolve_worker_service_concurrently() {
    let container = container(Arc::new(Mutex::new(0)));
    let guard = WorkerScopeGuard::new(container.clone(), next_worker_id());

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let inner = container.clone();
            guard.spawn(async move { resolve_current(&inner, "slow_pool") })
        })
        .collect();

    let mut pools = Vec::new();
    for handle in handles {
        pools.push(handle.await.unwrap().unwrap());
    }
    assert!(pools[0].ptr_eq(&pools[1]));
    assert!(container.active_tasks().is_empty());

    drop(guard);
    assert!(container.active_workers().is_empty());
}
