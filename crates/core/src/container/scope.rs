use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::container::context::{ExecutionContext, TaskId, WorkerId};
use crate::container::definition::DefinitionTable;
use crate::container::lifecycle::{DisposalFailure, TeardownReport};
use crate::container::resolver::{DependencyGraph, FrameOwner, ResolutionPath, StackGuard};
use crate::container::types::{TypeRegistry, TASK_SCOPE_MARKER, WORKER_SCOPE_MARKER};
use crate::container::value::Instance;
use crate::errors::CoreError;

/// Service scope enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// Single instance shared across the whole container
    #[default]
    Global,
    /// One instance per worker context
    Worker,
    /// One instance per task context
    Task,
}

impl ScopeKind {
    pub fn is_global(&self) -> bool {
        matches!(self, ScopeKind::Global)
    }

    pub fn is_worker(&self) -> bool {
        matches!(self, ScopeKind::Worker)
    }

    pub fn is_task(&self) -> bool {
        matches!(self, ScopeKind::Task)
    }

    /// Get the scope name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Global => "global",
            ScopeKind::Worker => "worker",
            ScopeKind::Task => "task",
        }
    }

    /// Declared scope wins; otherwise the class's scope marker decides
    pub fn effective(declared: Option<ScopeKind>, class: &str, types: &TypeRegistry) -> Self {
        if let Some(scope) = declared {
            return scope;
        }
        if types.is_assignable(class, TASK_SCOPE_MARKER) {
            ScopeKind::Task
        } else if types.is_assignable(class, WORKER_SCOPE_MARKER) {
            ScopeKind::Worker
        } else {
            ScopeKind::Global
        }
    }

    /// The cache a request of this kind lands in, falling back Task -> Worker -> Global
    pub fn target(self, ctx: &ExecutionContext) -> ScopeTarget {
        match (self, ctx.task_id(), ctx.worker_id()) {
            (ScopeKind::Task, Some(task), _) => ScopeTarget::Task(task),
            (ScopeKind::Task | ScopeKind::Worker, _, Some(worker)) => ScopeTarget::Worker(worker),
            _ => ScopeTarget::Global,
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ScopeKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "global" => Ok(ScopeKind::Global),
            "worker" => Ok(ScopeKind::Worker),
            "task" => Ok(ScopeKind::Task),
            _ => Err(CoreError::configuration(format!("unknown scope kind {}", s))),
        }
    }
}

/// Concrete cache selected for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTarget {
    Global,
    Worker(WorkerId),
    Task(TaskId),
}

impl ScopeTarget {
    pub fn kind(&self) -> ScopeKind {
        match self {
            ScopeTarget::Global => ScopeKind::Global,
            ScopeTarget::Worker(_) => ScopeKind::Worker,
            ScopeTarget::Task(_) => ScopeKind::Task,
        }
    }
}

/// Cache, resolution stacks and cleanup flag of one scope instance.
///
/// Resolution never suspends, so the calling thread identifies the logical
/// context for the whole of one resolution. Each caller gets its own stack;
/// concurrent callers never see each other's frames as cycles.
#[derive(Debug, Default)]
pub struct ScopeState {
    cache: HashMap<String, Instance>,
    /// Cached classes in construction order
    order: Vec<String>,
    stacks: HashMap<ThreadId, ResolutionPath>,
    in_cleanup: bool,
}

impl ScopeState {
    pub fn lookup(&self, class: &str) -> Option<Instance> {
        self.cache.get(class).cloned()
    }

    /// Insert unless already cached; the cached instance wins
    pub fn insert(&mut self, class: &str, instance: Instance) -> Instance {
        if let Some(existing) = self.cache.get(class) {
            return existing.clone();
        }
        self.order.push(class.to_string());
        self.cache.insert(class.to_string(), instance.clone());
        instance
    }

    pub fn take(&mut self, class: &str) -> Option<Instance> {
        let instance = self.cache.remove(class)?;
        self.order.retain(|c| c != class);
        Some(instance)
    }

    pub fn cached_classes(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Cycle and depth check on the calling thread's stack, then push `id`
    pub fn enter(&mut self, id: &str, max_depth: usize) -> Result<(), CoreError> {
        self.stacks
            .entry(thread::current().id())
            .or_default()
            .enter(id, max_depth)
    }

    pub fn leave(&mut self, id: &str) {
        let caller = thread::current().id();
        if let Some(stack) = self.stacks.get_mut(&caller) {
            stack.leave(id);
            if stack.is_empty() {
                self.stacks.remove(&caller);
            }
        }
    }

    /// Whether any caller is in the middle of a resolution
    pub fn is_resolving(&self) -> bool {
        !self.stacks.is_empty()
    }
}

/// Storage contract shared by the three scope managers
pub trait ScopeStore: FrameOwner {
    fn kind(&self) -> ScopeKind;
    fn label(&self) -> String;
    fn lookup(&self, class: &str) -> Option<Instance>;
    fn in_cleanup(&self) -> bool;
    /// Cycle and depth check, then push `id` onto this scope's stack
    fn push_frame(&self, id: &str, max_depth: usize) -> Result<(), CoreError>;
    fn insert(&self, class: &str, instance: Instance) -> Instance;
}

/// Scoped `get`: cache hit, cleanup check, cycle check, build, cache by class
pub fn resolve_in<S, F>(
    store: &S,
    id: &str,
    class: &str,
    max_depth: usize,
    build: F,
) -> Result<Instance, CoreError>
where
    S: ScopeStore,
    F: FnOnce() -> Result<Instance, CoreError>,
{
    if let Some(instance) = store.lookup(class) {
        trace!(id, class, scope = %store.kind(), "scope cache hit");
        return Ok(instance);
    }

    if store.in_cleanup() {
        return Err(CoreError::CleanupViolation {
            scope: store.kind(),
            context: store.label(),
            id: id.to_string(),
        });
    }

    store.push_frame(id, max_depth)?;
    let _guard = StackGuard::new(store, id);

    let instance = build()?;
    let cached = store.insert(class, instance.clone());
    if !cached.ptr_eq(&instance) {
        debug!(id, class, scope = %store.kind(), "another caller cached this class first, dropping the new instance");
    }
    Ok(cached)
}

/// Process-wide cache.
///
/// The lock is re-entrant and held for the whole construction, so nested
/// global resolutions on the same thread proceed while other threads wait.
/// The stack therefore always belongs to the lock holder.
#[derive(Default)]
pub struct GlobalScope {
    state: ReentrantMutex<RefCell<ScopeState>>,
}

struct GlobalFrame<'a> {
    state: &'a RefCell<ScopeState>,
}

impl FrameOwner for GlobalFrame<'_> {
    fn pop_frame(&self, id: &str) {
        self.state.borrow_mut().leave(id);
    }
}

impl ScopeStore for GlobalFrame<'_> {
    fn kind(&self) -> ScopeKind {
        ScopeKind::Global
    }

    fn label(&self) -> String {
        "global".to_string()
    }

    fn lookup(&self, class: &str) -> Option<Instance> {
        self.state.borrow().lookup(class)
    }

    fn in_cleanup(&self) -> bool {
        self.state.borrow().in_cleanup
    }

    fn push_frame(&self, id: &str, max_depth: usize) -> Result<(), CoreError> {
        self.state.borrow_mut().enter(id, max_depth)
    }

    fn insert(&self, class: &str, instance: Instance) -> Instance {
        self.state.borrow_mut().insert(class, instance)
    }
}

impl GlobalScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<F>(
        &self,
        id: &str,
        class: &str,
        max_depth: usize,
        build: F,
    ) -> Result<Instance, CoreError>
    where
        F: FnOnce() -> Result<Instance, CoreError>,
    {
        let guard = self.state.lock();
        let frame = GlobalFrame { state: &guard };
        resolve_in(&frame, id, class, max_depth, build)
    }

    pub fn contains(&self, class: &str) -> bool {
        self.state.lock().borrow().cache.contains_key(class)
    }

    pub fn len(&self) -> usize {
        self.state.lock().borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_in_cleanup(&self) -> bool {
        self.state.lock().borrow().in_cleanup
    }

    pub fn begin_cleanup(&self) {
        self.state.lock().borrow_mut().in_cleanup = true;
    }

    /// Release every cached instance; the scope stays in cleanup afterwards
    pub fn teardown(&self, table: &DefinitionTable, types: &TypeRegistry) -> TeardownReport {
        let classes = {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            state.in_cleanup = true;
            state.cached_classes()
        };

        release_instances(
            TeardownReport::new(ScopeKind::Global, "global"),
            &classes,
            |class| self.state.lock().borrow_mut().take(class),
            table,
            types,
        )
    }
}

impl fmt::Debug for GlobalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalScope")
            .field("cached", &self.len())
            .finish()
    }
}

/// Cache of one worker or task context
#[derive(Debug)]
pub struct ScopeSlot {
    kind: ScopeKind,
    label: String,
    state: Mutex<ScopeState>,
}

impl ScopeSlot {
    pub fn new(kind: ScopeKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            state: Mutex::new(ScopeState::default()),
        }
    }

    /// Empty slot standing in for a context that was already torn down
    pub fn retired(kind: ScopeKind, label: impl Into<String>) -> Self {
        let slot = Self::new(kind, label);
        slot.begin_cleanup();
        slot
    }

    pub fn resolve<F>(
        &self,
        id: &str,
        class: &str,
        max_depth: usize,
        build: F,
    ) -> Result<Instance, CoreError>
    where
        F: FnOnce() -> Result<Instance, CoreError>,
    {
        resolve_in(self, id, class, max_depth, build)
    }

    pub fn contains(&self, class: &str) -> bool {
        self.state.lock().cache.contains_key(class)
    }

    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn begin_cleanup(&self) {
        self.state.lock().in_cleanup = true;
    }

    pub fn teardown(&self, table: &DefinitionTable, types: &TypeRegistry) -> TeardownReport {
        let classes = {
            let mut state = self.state.lock();
            state.in_cleanup = true;
            state.cached_classes()
        };

        release_instances(
            TeardownReport::new(self.kind, self.label.clone()),
            &classes,
            |class| self.state.lock().take(class),
            table,
            types,
        )
    }
}

impl FrameOwner for ScopeSlot {
    fn pop_frame(&self, id: &str) {
        self.state.lock().leave(id);
    }
}

impl ScopeStore for ScopeSlot {
    fn kind(&self) -> ScopeKind {
        self.kind
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn lookup(&self, class: &str) -> Option<Instance> {
        self.state.lock().lookup(class)
    }

    fn in_cleanup(&self) -> bool {
        self.state.lock().in_cleanup
    }

    fn push_frame(&self, id: &str, max_depth: usize) -> Result<(), CoreError> {
        self.state.lock().enter(id, max_depth)
    }

    fn insert(&self, class: &str, instance: Instance) -> Instance {
        self.state.lock().insert(class, instance)
    }
}

/// Per-context slots for one scope kind, keyed by worker or task identity.
///
/// Identities whose slot was torn down are remembered, so a context that
/// has ended can never start a fresh cache.
#[derive(Debug)]
pub struct ContextScopes<K>
where
    K: Eq + Hash + Copy + fmt::Display,
{
    kind: ScopeKind,
    slots: DashMap<K, Arc<ScopeSlot>>,
    retired: DashSet<K>,
}

impl<K> ContextScopes<K>
where
    K: Eq + Hash + Copy + fmt::Display,
{
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            slots: DashMap::new(),
            retired: DashSet::new(),
        }
    }

    /// The slot for `key`, and whether this call created it.
    ///
    /// A retired identity gets a detached slot that is already in cleanup.
    pub fn slot(&self, key: K) -> (Arc<ScopeSlot>, bool) {
        match self.slots.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(_) if self.retired.contains(&key) => {
                trace!(scope = %self.kind, context = %key, "request from retired context");
                (Arc::new(ScopeSlot::retired(self.kind, key.to_string())), false)
            }
            Entry::Vacant(entry) => {
                debug!(scope = %self.kind, context = %key, "creating scope cache");
                let slot = Arc::new(ScopeSlot::new(self.kind, key.to_string()));
                entry.insert(slot.clone());
                (slot, true)
            }
        }
    }

    pub fn existing(&self, key: K) -> Option<Arc<ScopeSlot>> {
        self.slots.get(&key).map(|slot| slot.value().clone())
    }

    /// Mark the context as in cleanup, creating its slot if needed
    pub fn begin_cleanup(&self, key: K) -> (Arc<ScopeSlot>, bool) {
        let (slot, created) = self.slot(key);
        slot.begin_cleanup();
        (slot, created)
    }

    pub fn remove(&self, key: K) -> Option<Arc<ScopeSlot>> {
        self.slots.remove(&key).map(|(_, slot)| slot)
    }

    /// Forget the slot for `key` and refuse to create another one
    pub fn retire(&self, key: K) -> Option<Arc<ScopeSlot>> {
        self.retired.insert(key);
        self.remove(key)
    }

    pub fn is_retired(&self, key: K) -> bool {
        self.retired.contains(&key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.slots.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Release cached instances so that dependents go before their dependencies
fn release_instances<T>(
    mut report: TeardownReport,
    classes: &[String],
    take: T,
    table: &DefinitionTable,
    types: &TypeRegistry,
) -> TeardownReport
where
    T: Fn(&str) -> Option<Instance>,
{
    let mut class_of: HashMap<String, String> = HashMap::new();
    let mut graph = DependencyGraph::new();

    for class in classes {
        let mut ids = table.ids_by_class(class);
        if ids.is_empty() {
            ids.push(class.clone());
        }
        for id in ids {
            graph.add_service(&id, table.depends_on(&id));
            class_of.insert(id, class.clone());
        }
    }
    graph.build_reverse_dependencies();

    let order = graph.release_order().unwrap_or_else(|e| {
        warn!(
            scope = %report.scope,
            context = %report.context,
            error = %e,
            "depends_on cycle among cached services, releasing in reverse construction order"
        );
        classes
            .iter()
            .rev()
            .flat_map(|class| {
                let ids = table.ids_by_class(class);
                if ids.is_empty() {
                    vec![class.clone()]
                } else {
                    ids
                }
            })
            .collect()
    });

    for id in order {
        let Some(class) = class_of.get(&id) else {
            continue;
        };
        let Some(instance) = take(class) else {
            continue;
        };

        if let Some(disposer) = types.class(class).and_then(|c| c.disposer()) {
            if let Err(error) = disposer(&instance) {
                warn!(id = %id, class = %class, error = %error, "disposer failed during teardown");
                report.failures.push(DisposalFailure {
                    id: id.clone(),
                    error,
                });
            }
        }
        drop(instance);
        report.released.push(id);
    }

    debug!(
        scope = %report.scope,
        context = %report.context,
        released = report.released.len(),
        "scope torn down"
    );
    report
}
