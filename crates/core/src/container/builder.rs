use std::sync::Arc;

use tracing::debug;

use crate::config::ContainerConfig;
use crate::container::context::{ContextLifecycle, ExecutionContext};
use crate::container::definition::{DefinitionTable, ServiceDefinition};
use crate::container::types::{ClassDescriptor, TypeRegistry};
use crate::container::Container;
use crate::errors::{CoreError, ErrorHook};

/// Builder for constructing containers
pub struct ContainerBuilder {
    table: DefinitionTable,
    types: TypeRegistry,
    config: ContainerConfig,
    lifecycle: Option<Arc<dyn ContextLifecycle>>,
    error_hook: Option<ErrorHook>,
}

impl ContainerBuilder {
    /// Create a new container builder
    pub fn new() -> Self {
        Self {
            table: DefinitionTable::new(),
            types: TypeRegistry::new(),
            config: ContainerConfig::default(),
            lifecycle: None,
            error_hook: None,
        }
    }

    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the definition table
    pub fn with_definitions(mut self, table: DefinitionTable) -> Self {
        self.table = table;
        self
    }

    /// Add a single definition
    pub fn add_definition(mut self, definition: ServiceDefinition) -> Result<Self, CoreError> {
        self.table.insert(definition)?;
        Ok(self)
    }

    /// Replace the type registry
    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    /// Register one class
    pub fn register_class(mut self, descriptor: ClassDescriptor) -> Result<Self, CoreError> {
        self.types.register(descriptor)?;
        Ok(self)
    }

    /// Host hook that reports when worker and task contexts end
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn ContextLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Translate errors leaving `Container::get`
    pub fn with_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(CoreError) -> CoreError + Send + Sync + 'static,
    {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    /// Configure the builder from a configuration closure
    pub fn configure<F>(self, configure: F) -> Result<Self, CoreError>
    where
        F: FnOnce(Self) -> Result<Self, CoreError>,
    {
        configure(self)
    }

    /// Build the container
    pub fn build(self) -> Result<Container, CoreError> {
        self.config.validate()?;
        let initialize = self.config.initialize_on_build;

        debug!(
            definitions = self.table.len(),
            classes = self.types.len(),
            "building container"
        );
        let container = Container::from_parts(
            self.table,
            self.types,
            self.config,
            self.lifecycle,
            self.error_hook,
        );

        if initialize {
            container.initialize(&ExecutionContext::global())?;
        }
        Ok(container)
    }

    /// Build and initialize the container from the given context
    pub fn build_and_initialize(self, ctx: &ExecutionContext) -> Result<Container, CoreError> {
        let container = self.build()?;
        container.initialize(ctx)?;
        Ok(container)
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
