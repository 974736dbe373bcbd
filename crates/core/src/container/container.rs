use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, info};

use crate::config::ContainerConfig;
use crate::container::context::{ContextLifecycle, ExecutionContext, TaskId, WorkerId};
use crate::container::definition::DefinitionTable;
use crate::container::engine::{Engine, ServiceResolver};
use crate::container::lifecycle::TeardownReport;
use crate::container::resolver::DependencyGraph;
use crate::container::scope::{ContextScopes, GlobalScope, ScopeKind, ScopeSlot, ScopeTarget};
use crate::container::types::TypeRegistry;
use crate::container::value::Instance;
use crate::errors::{CoreError, ErrorHook};

pub(crate) struct ContainerInner {
    pub(crate) table: DefinitionTable,
    pub(crate) types: TypeRegistry,
    pub(crate) config: ContainerConfig,
    pub(crate) global: GlobalScope,
    pub(crate) workers: ContextScopes<WorkerId>,
    pub(crate) tasks: ContextScopes<TaskId>,
    pub(crate) lifecycle: Option<Arc<dyn ContextLifecycle>>,
    pub(crate) error_hook: Option<ErrorHook>,
    pub(crate) initialized: AtomicBool,
}

/// Main dependency injection container.
///
/// Cheap to clone; clones share the definition table and every scope cache.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    pub(crate) fn from_parts(
        table: DefinitionTable,
        types: TypeRegistry,
        config: ContainerConfig,
        lifecycle: Option<Arc<dyn ContextLifecycle>>,
        error_hook: Option<ErrorHook>,
    ) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                table,
                types,
                config,
                global: GlobalScope::new(),
                workers: ContextScopes::new(ScopeKind::Worker),
                tasks: ContextScopes::new(ScopeKind::Task),
                lifecycle,
                error_hook,
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Container with the given definitions and classes and default configuration
    pub fn new(table: DefinitionTable, types: TypeRegistry) -> Self {
        Self::from_parts(table, types, ContainerConfig::default(), None, None)
    }

    /// Check if a service id is defined
    pub fn has(&self, id: &str) -> bool {
        self.inner.table.has(id)
    }

    /// Resolve a defined service from the given execution context
    pub fn get(&self, ctx: &ExecutionContext, id: &str) -> Result<Instance, CoreError> {
        let result = if self.has(id) {
            self.resolve_scoped(ctx, id)
        } else {
            Err(CoreError::service_not_found(id))
        };
        result.map_err(|e| self.translate(e))
    }

    /// Resolve a service and downcast it to `T`
    pub fn get_as<T: Any + Send + Sync>(
        &self,
        ctx: &ExecutionContext,
        id: &str,
    ) -> Result<Arc<T>, CoreError> {
        let instance = self.get(ctx, id)?;
        instance.downcast::<T>().ok_or_else(|| {
            self.translate(CoreError::configuration(format!(
                "dependency {} is a {} and not a {}",
                id,
                instance.class_name(),
                std::any::type_name::<T>()
            )))
        })
    }

    pub fn get_class_by_id(&self, id: &str) -> Result<String, CoreError> {
        self.inner.table.resolve_class_name(id, &self.inner.types)
    }

    pub fn get_ids_by_class(&self, class_name: &str) -> Vec<String> {
        self.inner.table.ids_by_class(class_name)
    }

    /// Effective scope kind of a service
    pub fn get_dependency_type(&self, id: &str) -> Result<ScopeKind, CoreError> {
        let definition = self.inner.table.definition_for(id, &self.inner.types)?;
        Ok(ScopeKind::effective(
            definition.scope,
            &definition.class_name,
            &self.inner.types,
        ))
    }

    /// Check whether `get(id)` from `ctx` would be a cache hit
    pub fn is_instantiated(&self, ctx: &ExecutionContext, id: &str) -> bool {
        let Ok(definition) = self.inner.table.definition_for(id, &self.inner.types) else {
            return false;
        };
        let class = definition.class_name.as_str();
        let scope = ScopeKind::effective(definition.scope, class, &self.inner.types);

        match scope.target(ctx) {
            ScopeTarget::Global => self.inner.global.contains(class),
            ScopeTarget::Worker(worker) => self
                .inner
                .workers
                .existing(worker)
                .map_or(false, |slot| slot.contains(class)),
            ScopeTarget::Task(task) => self
                .inner
                .tasks
                .existing(task)
                .map_or(false, |slot| slot.contains(class)),
        }
    }

    /// Resolve every `initialize_immediately` definition once
    pub fn initialize(&self, ctx: &ExecutionContext) -> Result<(), CoreError> {
        if self.is_initialized() {
            return Ok(());
        }

        let eager: Vec<&str> = self
            .inner
            .table
            .iter()
            .filter(|d| d.initialize_immediately)
            .map(|d| d.id.as_str())
            .collect();

        for id in &eager {
            self.get(ctx, id)?;
        }

        self.inner.initialized.store(true, Ordering::Release);
        info!(services = eager.len(), "container initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Check that every `depends_on` edge names a known service and that the edges are acyclic
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut graph = DependencyGraph::new();

        for definition in self.inner.table.iter() {
            for dependency in &definition.depends_on {
                if !self.inner.table.has(dependency) && !self.inner.types.is_concrete(dependency) {
                    return Err(CoreError::configuration(format!(
                        "dependency {} declares depends_on {} which is not defined",
                        definition.id, dependency
                    )));
                }
            }
            graph.add_service(&definition.id, &definition.depends_on);
        }

        graph.build_reverse_dependencies();
        graph.detect_cycles()
    }

    /// Mark a task context as in cleanup; cache misses from it now fail
    pub fn begin_task_cleanup(&self, task: TaskId) {
        let (_, created) = self.inner.tasks.begin_cleanup(task);
        if created {
            self.register_task_teardown(task);
        }
    }

    /// Release a task context's instances; later misses from it keep failing
    pub fn teardown_task(&self, task: TaskId) -> Option<TeardownReport> {
        let slot = self.inner.tasks.existing(task)?;
        let report = slot.teardown(&self.inner.table, &self.inner.types);
        self.inner.tasks.retire(task);
        Some(report)
    }

    /// Mark a worker context as in cleanup; cache misses from it now fail
    pub fn begin_worker_cleanup(&self, worker: WorkerId) {
        let (_, created) = self.inner.workers.begin_cleanup(worker);
        if created {
            self.register_worker_teardown(worker);
        }
    }

    /// Release a worker context's instances; later misses from it keep failing
    pub fn teardown_worker(&self, worker: WorkerId) -> Option<TeardownReport> {
        let slot = self.inner.workers.existing(worker)?;
        let report = slot.teardown(&self.inner.table, &self.inner.types);
        self.inner.workers.retire(worker);
        Some(report)
    }

    /// Tear down every task, then every worker, then the global cache
    pub fn shutdown(&self) -> Vec<TeardownReport> {
        let mut reports = Vec::new();

        for task in self.inner.tasks.keys() {
            reports.extend(self.teardown_task(task));
        }
        for worker in self.inner.workers.keys() {
            reports.extend(self.teardown_worker(worker));
        }
        reports.push(
            self.inner
                .global
                .teardown(&self.inner.table, &self.inner.types),
        );

        info!(scopes = reports.len(), "container shut down");
        reports
    }

    pub fn definitions(&self) -> &DefinitionTable {
        &self.inner.table
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.inner.types
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// Number of instances cached in one scope
    pub fn cached_count(&self, target: ScopeTarget) -> usize {
        match target {
            ScopeTarget::Global => self.inner.global.len(),
            ScopeTarget::Worker(worker) => self
                .inner
                .workers
                .existing(worker)
                .map_or(0, |slot| slot.len()),
            ScopeTarget::Task(task) => self
                .inner
                .tasks
                .existing(task)
                .map_or(0, |slot| slot.len()),
        }
    }

    pub fn active_tasks(&self) -> Vec<TaskId> {
        self.inner.tasks.keys()
    }

    pub fn active_workers(&self) -> Vec<WorkerId> {
        self.inner.workers.keys()
    }

    fn translate(&self, error: CoreError) -> CoreError {
        match &self.inner.error_hook {
            Some(hook) => hook(error),
            None => error,
        }
    }

    /// Scoped `get` used for the top-level request and every nested dependency
    fn resolve_scoped(&self, ctx: &ExecutionContext, id: &str) -> Result<Instance, CoreError> {
        let inner = &*self.inner;
        let definition = inner.table.definition_for(id, &inner.types)?;
        let class = definition.class_name.clone();
        let scope = ScopeKind::effective(definition.scope, &class, &inner.types);
        let depth = inner.config.max_resolution_depth;

        let build = || {
            Engine::new(&inner.table, &inner.types, &inner.config, self)
                .instantiate(ctx, &definition)
        };

        match scope.target(ctx) {
            ScopeTarget::Global => inner.global.resolve(id, &class, depth, build),
            ScopeTarget::Worker(worker) => {
                self.worker_slot(worker).resolve(id, &class, depth, build)
            }
            ScopeTarget::Task(task) => self.task_slot(task).resolve(id, &class, depth, build),
        }
    }

    fn task_slot(&self, task: TaskId) -> Arc<ScopeSlot> {
        let (slot, created) = self.inner.tasks.slot(task);
        if created {
            self.register_task_teardown(task);
        }
        slot
    }

    fn worker_slot(&self, worker: WorkerId) -> Arc<ScopeSlot> {
        let (slot, created) = self.inner.workers.slot(worker);
        if created {
            self.register_worker_teardown(worker);
        }
        slot
    }

    fn register_task_teardown(&self, task: TaskId) {
        if let Some(lifecycle) = &self.inner.lifecycle {
            let weak = Arc::downgrade(&self.inner);
            debug!(task = %task, "registering task teardown");
            lifecycle.on_task_exit(
                task,
                Box::new(move || {
                    if let Some(container) = Container::upgrade(&weak) {
                        container.teardown_task(task);
                    }
                }),
            );
        }
    }

    fn register_worker_teardown(&self, worker: WorkerId) {
        if let Some(lifecycle) = &self.inner.lifecycle {
            let weak = Arc::downgrade(&self.inner);
            debug!(worker = %worker, "registering worker teardown");
            lifecycle.on_worker_exit(
                worker,
                Box::new(move || {
                    if let Some(container) = Container::upgrade(&weak) {
                        container.teardown_worker(worker);
                    }
                }),
            );
        }
    }

    fn upgrade(weak: &Weak<ContainerInner>) -> Option<Container> {
        weak.upgrade().map(|inner| Container { inner })
    }
}

impl ServiceResolver for Container {
    fn resolve(&self, ctx: &ExecutionContext, id: &str) -> Result<Instance, CoreError> {
        self.resolve_scoped(ctx, id)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("definitions", &self.inner.table.len())
            .field("classes", &self.inner.types.len())
            .field("global_cached", &self.inner.global.len())
            .field("active_workers", &self.inner.workers.len())
            .field("active_tasks", &self.inner.tasks.len())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
