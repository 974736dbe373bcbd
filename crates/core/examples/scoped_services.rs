//! Example: global, worker and task scoped services on a tokio runtime
//!
//! Run with `RUST_LOG=tessera_core=debug` to see scope teardown events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;
use tessera_core::container::ConstructorParameter;
use tessera_core::runtime::next_worker_id;
use tessera_core::{
    resolve_current, ClassDescriptor, ContainerBuilder, CoreError, DefinitionTable, Dispose,
    WorkerScopeGuard,
};
use tracing_subscriber::EnvFilter;

struct Settings {
    app_name: String,
}

struct ConnectionPool {
    size: i64,
    opened: AtomicU64,
}

struct RequestContext {
    pool: Arc<ConnectionPool>,
    connection: u64,
}

impl Dispose for RequestContext {
    fn dispose(&self) -> Result<(), CoreError> {
        tracing::info!(connection = self.connection, "returning connection to pool");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let definitions = DefinitionTable::from_value(json!({
        "settings": {"class": "Settings", "args": {"app_name": "inventory"}},
        "pool": {"class": "ConnectionPool", "args": {"size": 4}},
        "request": {"class": "RequestContext", "args": {"pool": "pool"}}
    }))?;

    let container = ContainerBuilder::new()
        .with_definitions(definitions)
        .register_class(
            ClassDescriptor::concrete("Settings")
                .param(ConstructorParameter::typed("app_name", "string"))
                .factory(|args| {
                    Ok(Settings {
                        app_name: args.string("app_name")?.to_string(),
                    })
                }),
        )?
        .register_class(
            ClassDescriptor::concrete("ConnectionPool")
                .worker_scoped()
                .param(ConstructorParameter::typed("size", "int"))
                .factory(|args| {
                    Ok(ConnectionPool {
                        size: args.int("size")?,
                        opened: AtomicU64::new(0),
                    })
                }),
        )?
        .register_class(
            ClassDescriptor::concrete("RequestContext")
                .task_scoped()
                .param(ConstructorParameter::typed("pool", "ConnectionPool"))
                .factory(|args| {
                    let pool = args.object::<ConnectionPool>("pool")?;
                    let connection = pool.opened.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(RequestContext { pool, connection })
                })
                .disposable::<RequestContext>(),
        )?
        .build()?;

    let worker = WorkerScopeGuard::new(container.clone(), next_worker_id());
    let mut handles = Vec::new();
    for request in 0..3 {
        let container = container.clone();
        handles.push(worker.spawn(async move {
            let settings = resolve_current(&container, "settings")?;
            let ctx = resolve_current(&container, "request")?;
            let settings = settings.downcast_ref::<Settings>().map(|s| s.app_name.clone());
            if let Some(ctx) = ctx.downcast_ref::<RequestContext>() {
                tracing::info!(
                    request,
                    app = ?settings,
                    connection = ctx.connection,
                    pool_size = ctx.pool.size,
                    "handled request"
                );
            }
            Ok::<_, CoreError>(())
        }));
    }

    for handle in handles {
        if let Ok(result) = handle.await {
            result?;
        }
    }
    drop(worker);

    for report in container.shutdown() {
        tracing::info!(%report, "scope released");
    }
    Ok(())
}
