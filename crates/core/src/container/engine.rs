//! Resolution engine: turns one service definition into a constructed instance.

use tracing::{debug, trace};

use crate::config::ContainerConfig;
use crate::container::binder::{Binder, Binding};
use crate::container::context::ExecutionContext;
use crate::container::definition::{DefinitionTable, ServiceDefinition};
use crate::container::types::{TypeHint, TypeRegistry};
use crate::container::value::{Arguments, Instance, Value};
use crate::errors::CoreError;

/// Trait for resolving nested dependencies during construction.
///
/// Implementors route the request through the scoped `get` path so caching,
/// cycle detection and cleanup checks apply to every nested id.
pub trait ServiceResolver {
    fn resolve(&self, ctx: &ExecutionContext, id: &str) -> Result<Instance, CoreError>;
}

/// Stateless constructor; the calling scope owns caching
pub struct Engine<'a> {
    table: &'a DefinitionTable,
    types: &'a TypeRegistry,
    config: &'a ContainerConfig,
    resolver: &'a dyn ServiceResolver,
}

impl<'a> Engine<'a> {
    pub fn new(
        table: &'a DefinitionTable,
        types: &'a TypeRegistry,
        config: &'a ContainerConfig,
        resolver: &'a dyn ServiceResolver,
    ) -> Self {
        Self {
            table,
            types,
            config,
            resolver,
        }
    }

    pub fn instantiate(
        &self,
        ctx: &ExecutionContext,
        definition: &ServiceDefinition,
    ) -> Result<Instance, CoreError> {
        let class_name = definition.class_name.as_str();
        let descriptor = self.types.class(class_name).ok_or_else(|| {
            CoreError::configuration(format!(
                "class {} for dependency {} is not found",
                class_name, definition.id
            ))
        })?;

        if descriptor.is_interface() {
            return Err(CoreError::configuration(format!(
                "dependency {} names interface {} which cannot be instantiated",
                definition.id, class_name
            )));
        }
        let factory = descriptor.factory_fn().ok_or_else(|| {
            CoreError::configuration(format!(
                "class {} for dependency {} has no registered factory",
                class_name, definition.id
            ))
        })?;

        let params = self.types.constructor_params(class_name);

        for dependency in &definition.depends_on {
            trace!(id = %definition.id, dependency = %dependency, "resolving depends_on");
            self.resolver.resolve(ctx, dependency)?;
        }

        if definition.args.len() > params.len() {
            return Err(CoreError::configuration(format!(
                "dependency {} supplies {} arguments but the constructor of {} accepts {}",
                definition.id,
                definition.args.len(),
                class_name,
                params.len()
            )));
        }
        if let Some(unknown) = definition
            .args
            .keys()
            .find(|name| !params.iter().any(|p| &p.name == *name))
        {
            return Err(CoreError::configuration(format!(
                "argument {} on dependency {} does not match any constructor parameter of {}",
                unknown, definition.id, class_name
            )));
        }

        let binder = Binder::new(self.types, self.resolver, ctx, class_name);
        let mut arguments = Arguments::new(class_name);

        for param in params {
            match binder.bind(param, definition.args.get(&param.name))? {
                Binding::Value(value) => arguments.push(&param.name, value),
                Binding::Spread(values) => {
                    for value in values {
                        arguments.push(&param.name, value);
                    }
                }
                Binding::Unresolved => {
                    if let Some(default) = &param.default {
                        arguments.push(&param.name, default.clone());
                    } else if param.variadic {
                        continue;
                    } else if let Some(value) = self.autowire(ctx, param.hint())? {
                        arguments.push(&param.name, value);
                    } else {
                        return Err(CoreError::configuration(format!(
                            "The argument {} on dependency {} is not defined",
                            param.name, class_name
                        )));
                    }
                }
            }
        }

        let inner = factory(&arguments)
            .map_err(|e| CoreError::initialization_failed(class_name, e))?;

        if self.config.trace_resolutions {
            debug!(id = %definition.id, class = class_name, args = arguments.len(), "instantiated dependency");
        }

        Ok(Instance::from_arc(class_name, inner))
    }

    /// Resolve a class-typed parameter by its type name when that name is a
    /// definition id or a concrete class
    fn autowire(
        &self,
        ctx: &ExecutionContext,
        hint: Option<TypeHint>,
    ) -> Result<Option<Value>, CoreError> {
        let Some(TypeHint::Named(type_name)) = hint else {
            return Ok(None);
        };
        if !self.table.has(&type_name) && !self.types.is_concrete(&type_name) {
            return Ok(None);
        }

        let instance = self.resolver.resolve(ctx, &type_name)?;
        if !self.types.is_assignable(instance.class_name(), &type_name) {
            return Ok(None);
        }
        trace!(type_name = %type_name, class = instance.class_name(), "autowired parameter");
        Ok(Some(Value::Object(instance)))
    }
}
