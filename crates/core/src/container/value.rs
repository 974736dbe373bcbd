use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::CoreError;

/// Type-erased shared service object
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// A constructed service, tagged with the concrete class it was built from
#[derive(Clone)]
pub struct Instance {
    class_name: Arc<str>,
    inner: AnyArc,
}

impl Instance {
    /// Wrap a freshly built value
    pub fn new<T: Any + Send + Sync>(class_name: impl Into<Arc<str>>, value: T) -> Self {
        Self {
            class_name: class_name.into(),
            inner: Arc::new(value),
        }
    }

    /// Wrap an already shared value
    pub fn from_arc(class_name: impl Into<Arc<str>>, inner: AnyArc) -> Self {
        Self {
            class_name: class_name.into(),
            inner,
        }
    }

    /// The concrete class this instance was constructed as
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Get a typed handle to the instance
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    /// Borrow the instance as a concrete type
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Check if this instance is a `T`
    pub fn is<T: Any + Send + Sync>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Reference equality
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles to the underlying object
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class_name", &self.class_name)
            .field("ptr", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

/// Signature of zero-argument callables carried as values
pub type CallableFn = dyn Fn() -> Result<Value, CoreError> + Send + Sync;

/// A zero-argument callable value
#[derive(Clone)]
pub struct Callable(Arc<CallableFn>);

impl Callable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Result<Value, CoreError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self) -> Result<Value, CoreError> {
        (self.0)()
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable(<fn>)")
    }
}

/// A bound constructor argument
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Object(Instance),
    Callable(Callable),
}

impl Value {
    /// Short runtime shape name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) | Value::Map(_) => "array",
            Value::Object(_) => "object",
            Value::Callable(_) => "callable",
        }
    }

    /// Convert a raw definition argument
    pub fn from_json(raw: &serde_json::Value) -> Value {
        match raw {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Object(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Value::Callable(callable) => Some(callable),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Callable(a), Value::Callable(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(raw: serde_json::Value) -> Self {
        Value::from_json(&raw)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        Value::Object(instance)
    }
}

impl From<Callable> for Value {
    fn from(callable: Callable) -> Self {
        Value::Callable(callable)
    }
}

/// Positional arguments handed to a constructor factory.
///
/// Every value remembers the parameter it was bound to, so factories can read
/// them by name. Values spliced into a variadic parameter all carry that
/// parameter's name and sit at the end of the list.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    class_name: String,
    names: Vec<String>,
    values: Vec<Value>,
}

impl Arguments {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            names: Vec::new(),
            values: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, name: &str, value: Value) {
        self.names.push(name.to_string());
        self.values.push(value);
    }

    /// Builder-style push, handy when calling a factory directly
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.push(name, value.into());
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at a position
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// First value bound to a parameter
    pub fn named(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|index| &self.values[index])
    }

    /// All values spliced into a variadic parameter
    pub fn rest(&self, name: &str) -> &[Value] {
        match self.names.iter().position(|n| n == name) {
            Some(index) => &self.values[index..],
            None => &[],
        }
    }

    fn require(&self, name: &str) -> Result<&Value, CoreError> {
        self.named(name).ok_or_else(|| {
            CoreError::configuration(format!(
                "argument {} was not bound for {}",
                name, self.class_name
            ))
        })
    }

    fn mismatch(&self, name: &str, expected: &str, value: &Value) -> CoreError {
        CoreError::wrong_type(name, &self.class_name, expected, value.type_name())
    }

    pub fn int(&self, name: &str) -> Result<i64, CoreError> {
        let value = self.require(name)?;
        value.as_int().ok_or_else(|| self.mismatch(name, "int", value))
    }

    pub fn float(&self, name: &str) -> Result<f64, CoreError> {
        let value = self.require(name)?;
        value.as_float().ok_or_else(|| self.mismatch(name, "float", value))
    }

    pub fn bool(&self, name: &str) -> Result<bool, CoreError> {
        let value = self.require(name)?;
        value.as_bool().ok_or_else(|| self.mismatch(name, "bool", value))
    }

    pub fn string(&self, name: &str) -> Result<&str, CoreError> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| self.mismatch(name, "string", value))
    }

    pub fn array(&self, name: &str) -> Result<&[Value], CoreError> {
        let value = self.require(name)?;
        value.as_array().ok_or_else(|| self.mismatch(name, "array", value))
    }

    pub fn callable(&self, name: &str) -> Result<&Callable, CoreError> {
        let value = self.require(name)?;
        value
            .as_callable()
            .ok_or_else(|| self.mismatch(name, "callable", value))
    }

    pub fn instance(&self, name: &str) -> Result<&Instance, CoreError> {
        let value = self.require(name)?;
        value
            .as_instance()
            .ok_or_else(|| self.mismatch(name, "object", value))
    }

    /// Typed handle to an injected service
    pub fn object<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, CoreError> {
        let instance = self.instance(name)?;
        instance.downcast::<T>().ok_or_else(|| {
            CoreError::wrong_type(
                name,
                &self.class_name,
                std::any::type_name::<T>(),
                instance.class_name(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_shapes() {
        assert_eq!(Value::from_json(&json!(5)), Value::Int(5));
        assert_eq!(Value::from_json(&json!(2.5)), Value::Float(2.5));
        assert_eq!(Value::from_json(&json!("x")), Value::String("x".into()));
        assert_eq!(
            Value::from_json(&json!([1, true])),
            Value::Array(vec![Value::Int(1), Value::Bool(true)])
        );
        assert_eq!(Value::from_json(&json!({"a": 1})).type_name(), "array");
    }

    #[test]
    fn test_instance_identity() {
        let a = Instance::new("Alpha", 1u32);
        let b = a.clone();
        let c = Instance::new("Alpha", 1u32);

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.class_name(), "Alpha");
        assert_eq!(a.downcast_ref::<u32>(), Some(&1));
        assert!(a.downcast::<String>().is_none());
    }

    #[test]
    fn test_arguments_accessors() {
        let args = Arguments::new("Sample")
            .with("name", "svc")
            .with("count", 3i64)
            .with("items", 1i64)
            .with("items", 2i64);

        assert_eq!(args.string("name").unwrap(), "svc");
        assert_eq!(args.int("count").unwrap(), 3);
        assert_eq!(args.float("count").unwrap(), 3.0);
        assert_eq!(args.rest("items"), &[Value::Int(1), Value::Int(2)]);
        assert!(args.rest("missing").is_empty());
        assert!(args.bool("name").unwrap_err().is_configuration());
        assert!(args.int("missing").is_err());
    }
}
