//! Binds one raw definition argument to one constructor parameter.

use tracing::trace;

use crate::container::context::ExecutionContext;
use crate::container::engine::ServiceResolver;
use crate::container::types::{ConstructorParameter, PrimitiveKind, TypeHint, TypeRegistry};
use crate::container::value::Value;
use crate::errors::CoreError;

/// Result of binding a parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// A single positional argument
    Value(Value),
    /// Several positional arguments spliced into a variadic parameter
    Spread(Vec<Value>),
    /// Nothing was supplied; defaults and autowiring decide
    Unresolved,
}

pub struct Binder<'a> {
    types: &'a TypeRegistry,
    resolver: &'a dyn ServiceResolver,
    ctx: &'a ExecutionContext,
    class_name: &'a str,
}

impl<'a> Binder<'a> {
    pub fn new(
        types: &'a TypeRegistry,
        resolver: &'a dyn ServiceResolver,
        ctx: &'a ExecutionContext,
        class_name: &'a str,
    ) -> Self {
        Self {
            types,
            resolver,
            ctx,
            class_name,
        }
    }

    pub fn bind(
        &self,
        param: &ConstructorParameter,
        raw: Option<&serde_json::Value>,
    ) -> Result<Binding, CoreError> {
        let hint = param.hint();

        if let Some(TypeHint::Unsupported(name)) = &hint {
            return Err(CoreError::configuration(format!(
                "argument {} on dependency {} has unsupported type {}",
                param.name, self.class_name, name
            )));
        }

        if let Some(TypeHint::Named(type_name)) = &hint {
            self.ensure_type_exists(param, type_name)?;
        }

        let Some(raw) = raw else {
            return Ok(Binding::Unresolved);
        };

        let Some(hint) = hint else {
            return Ok(untyped(param, Value::from_json(raw)));
        };

        if let Some(produced) = self.invoke_factory_reference(param, raw)? {
            return match &hint {
                TypeHint::Primitive(kind) => self.bind_primitive(param, *kind, produced),
                TypeHint::Named(type_name) => self.bind_object(param, type_name, produced),
                TypeHint::Unsupported(_) => Ok(Binding::Value(produced)),
            };
        }

        match &hint {
            TypeHint::Primitive(kind) => self.bind_primitive(param, *kind, Value::from_json(raw)),
            TypeHint::Named(type_name) => self.bind_service_reference(param, type_name, raw),
            TypeHint::Unsupported(_) => Ok(Binding::Value(Value::from_json(raw))),
        }
    }

    fn ensure_type_exists(
        &self,
        param: &ConstructorParameter,
        type_name: &str,
    ) -> Result<(), CoreError> {
        if self.types.contains_class(type_name) {
            return Ok(());
        }
        Err(CoreError::configuration(format!(
            "The argument {} on dependency {} is of type {} which is not found",
            param.name, self.class_name, type_name
        )))
    }

    /// `[class, method]` static factory or zero-argument function name
    fn invoke_factory_reference(
        &self,
        param: &ConstructorParameter,
        raw: &serde_json::Value,
    ) -> Result<Option<Value>, CoreError> {
        if let Some((class, method)) = static_pair(raw) {
            if self.types.contains_class(class) {
                if let Some(method_fn) = self.types.static_method(class, method) {
                    trace!(argument = %param.name, class, method, "invoking static factory method");
                    return method_fn().map(Some);
                }
            }
        }

        if let serde_json::Value::String(name) = raw {
            if let Some(function) = self.types.function(name) {
                trace!(argument = %param.name, function = %name, "invoking factory function");
                return function().map(Some);
            }
        }

        Ok(None)
    }

    fn bind_primitive(
        &self,
        param: &ConstructorParameter,
        kind: PrimitiveKind,
        value: Value,
    ) -> Result<Binding, CoreError> {
        if param.variadic {
            if let Value::Array(items) = value {
                return items
                    .into_iter()
                    .map(|item| self.coerce(param, kind, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Binding::Spread);
            }
        }
        self.coerce(param, kind, value).map(Binding::Value)
    }

    fn coerce(
        &self,
        param: &ConstructorParameter,
        kind: PrimitiveKind,
        value: Value,
    ) -> Result<Value, CoreError> {
        let actual = value.type_name();
        kind.coerce(value).ok_or_else(|| {
            CoreError::wrong_type(&param.name, self.class_name, kind.as_str(), actual)
        })
    }

    /// Validate a produced value against a class or interface type
    fn bind_object(
        &self,
        param: &ConstructorParameter,
        type_name: &str,
        value: Value,
    ) -> Result<Binding, CoreError> {
        if param.variadic {
            if let Value::Array(items) = value {
                return items
                    .into_iter()
                    .map(|item| self.check_object(param, type_name, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Binding::Spread);
            }
        }
        self.check_object(param, type_name, value).map(Binding::Value)
    }

    fn check_object(
        &self,
        param: &ConstructorParameter,
        type_name: &str,
        value: Value,
    ) -> Result<Value, CoreError> {
        let assignable = match &value {
            Value::Object(instance) => self.types.is_assignable(instance.class_name(), type_name),
            _ => false,
        };
        if assignable {
            return Ok(value);
        }
        let actual = match &value {
            Value::Object(instance) => instance.class_name(),
            other => other.type_name(),
        };
        Err(CoreError::wrong_type(
            &param.name,
            self.class_name,
            type_name,
            actual,
        ))
    }

    fn resolve_reference(
        &self,
        param: &ConstructorParameter,
        type_name: &str,
        id: &str,
    ) -> Result<Value, CoreError> {
        let instance = self.resolver.resolve(self.ctx, id)?;
        self.check_object(param, type_name, Value::Object(instance))
    }

    fn bind_service_reference(
        &self,
        param: &ConstructorParameter,
        type_name: &str,
        raw: &serde_json::Value,
    ) -> Result<Binding, CoreError> {
        match raw {
            serde_json::Value::String(id) => self
                .resolve_reference(param, type_name, id)
                .map(Binding::Value),
            serde_json::Value::Array(items) if param.variadic => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(id) => self.resolve_reference(param, type_name, id),
                    other => Err(CoreError::wrong_type(
                        &param.name,
                        self.class_name,
                        type_name,
                        Value::from_json(other).type_name(),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Binding::Spread),
            serde_json::Value::Array(items) if items.len() == 2 => {
                Err(CoreError::configuration(format!(
                    "invalid callable {} supplied for argument {} on dependency {}",
                    raw, param.name, self.class_name
                )))
            }
            other => Err(CoreError::wrong_type(
                &param.name,
                self.class_name,
                type_name,
                Value::from_json(other).type_name(),
            )),
        }
    }
}

fn untyped(param: &ConstructorParameter, value: Value) -> Binding {
    match value {
        Value::Array(items) if param.variadic => Binding::Spread(items),
        value => Binding::Value(value),
    }
}

fn static_pair(raw: &serde_json::Value) -> Option<(&str, &str)> {
    match raw.as_array().map(Vec::as_slice) {
        Some([serde_json::Value::String(class), serde_json::Value::String(method)]) => {
            Some((class.as_str(), method.as_str()))
        }
        _ => None,
    }
}
