//! Scoped dependency-resolution runtime.
//!
//! Services are described by an immutable [`DefinitionTable`] and constructed
//! on demand from registered [`ClassDescriptor`]s. Each service lives in one
//! of three scopes: global, per worker, or per task. The caller names the
//! worker and task it runs in through an [`ExecutionContext`].

pub mod config;
pub mod container;
pub mod errors;
pub mod runtime;

pub use config::{ConfigError, ConfigSource, ContainerConfig};
pub use container::{
    Arguments, Callable, ClassDescriptor, ConstructorParameter, Container, ContainerBuilder,
    ContextLifecycle, DefinitionTable, Dispose, ExecutionContext, Instance, ScopeKind,
    ScopeTarget, ServiceDefinition, TaskId, TeardownReport, TypeRegistry, Value, WorkerId,
};
pub use errors::{CoreError, ErrorHook, ErrorKind};
pub use runtime::{current_context, resolve_current, run_scoped, spawn_scoped, ExitHooks, WorkerScopeGuard};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
