#[allow(clippy::module_inception)]
pub mod container;
pub mod binder;
pub mod builder;
pub mod context;
pub mod definition;
pub mod engine;
pub mod lifecycle;
pub mod resolver;
pub mod scope;
pub mod types;
pub mod value;

pub use container::Container;
pub use binder::{Binder, Binding};
pub use builder::ContainerBuilder;
pub use context::{ContextLifecycle, ExecutionContext, TaskId, TeardownCallback, WorkerId};
pub use definition::{DefinitionTable, ServiceDefinition};
pub use engine::{Engine, ServiceResolver};
pub use lifecycle::{DisposalFailure, Dispose, TeardownReport};
pub use resolver::{DependencyGraph, FrameOwner, ResolutionPath, StackGuard};
pub use scope::{ContextScopes, GlobalScope, ScopeKind, ScopeSlot, ScopeState, ScopeStore, ScopeTarget};
pub use types::{
    ClassDescriptor, ClassKind, ConstructorParameter, PrimitiveKind, TypeHint, TypeRegistry,
    TASK_SCOPE_MARKER, WORKER_SCOPE_MARKER,
};
pub use value::{Arguments, Callable, Instance, Value};
