//! Class metadata registry.
//!
//! Every constructible service registers a [`ClassDescriptor`]: its name, its
//! ancestry, the capabilities it implements, its constructor parameters and a
//! factory. The resolution engine reads constructor signatures from here
//! instead of introspecting types at runtime.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::container::lifecycle::Dispose;
use crate::container::value::{AnyArc, Arguments, Instance, Value};
use crate::errors::CoreError;

/// Capability marking a class as worker-affine
pub const WORKER_SCOPE_MARKER: &str = "WorkerScoped";

/// Capability marking a class as task-affine
pub const TASK_SCOPE_MARKER: &str = "TaskScoped";

const RESERVED_TYPE_NAMES: &[&str] = &[
    "mixed", "void", "null", "never", "resource", "self", "static", "parent", "false", "true",
];

/// Builtin parameter kinds a literal argument can be checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Int,
    String,
    Float,
    Bool,
    Array,
    Object,
    Callable,
    Iterable,
}

impl PrimitiveKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "int" => Some(Self::Int),
            "string" => Some(Self::String),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            "callable" => Some(Self::Callable),
            "iterable" => Some(Self::Iterable),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::String => "string",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Array => "array",
            Self::Object => "object",
            Self::Callable => "callable",
            Self::Iterable => "iterable",
        }
    }

    /// Check the runtime shape of a value against this kind
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Int => matches!(value, Value::Int(_)),
            Self::String => matches!(value, Value::String(_)),
            Self::Float => matches!(value, Value::Float(_) | Value::Int(_)),
            Self::Bool => matches!(value, Value::Bool(_)),
            Self::Array | Self::Iterable => matches!(value, Value::Array(_) | Value::Map(_)),
            Self::Object => matches!(value, Value::Object(_)),
            Self::Callable => matches!(value, Value::Callable(_)),
        }
    }

    /// Validate and normalize a value, widening integers for float parameters
    pub fn coerce(&self, value: Value) -> Option<Value> {
        if !self.accepts(&value) {
            return None;
        }
        match (self, value) {
            (Self::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (_, value) => Some(value),
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classified declared type of a constructor parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeHint {
    Primitive(PrimitiveKind),
    /// A class or interface name
    Named(String),
    /// A builtin type name with no binding rule
    Unsupported(String),
}

impl TypeHint {
    pub fn classify(name: &str) -> Self {
        if let Some(kind) = PrimitiveKind::from_name(name) {
            return Self::Primitive(kind);
        }
        let lowered = name.to_ascii_lowercase();
        if RESERVED_TYPE_NAMES.contains(&lowered.as_str()) {
            return Self::Unsupported(name.to_string());
        }
        Self::Named(name.to_string())
    }
}

/// One parameter of a constructor signature
#[derive(Debug, Clone)]
pub struct ConstructorParameter {
    pub name: String,
    pub declared_type: Option<String>,
    pub default: Option<Value>,
    pub variadic: bool,
}

impl ConstructorParameter {
    /// Untyped parameter
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: None,
            default: None,
            variadic: false,
        }
    }

    /// Parameter with a declared type
    pub fn typed(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            declared_type: Some(declared_type.into()),
            ..Self::new(name)
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn hint(&self) -> Option<TypeHint> {
        self.declared_type.as_deref().map(TypeHint::classify)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Concrete,
    Interface,
}

/// Constructs a service from bound arguments
pub type ClassFactory = Arc<dyn Fn(&Arguments) -> Result<AnyArc, CoreError> + Send + Sync>;

/// Releases resources held by an instance at scope teardown
pub type Disposer = Arc<dyn Fn(&Instance) -> Result<(), CoreError> + Send + Sync>;

/// Zero-argument static method or free function
pub type StaticCallable = Arc<dyn Fn() -> Result<Value, CoreError> + Send + Sync>;

/// Metadata for one class or interface
#[derive(Clone)]
pub struct ClassDescriptor {
    name: String,
    kind: ClassKind,
    parent: Option<String>,
    implements: Vec<String>,
    params: Option<Vec<ConstructorParameter>>,
    factory: Option<ClassFactory>,
    disposer: Option<Disposer>,
}

impl ClassDescriptor {
    pub fn concrete(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Concrete,
            parent: None,
            implements: Vec::new(),
            params: None,
            factory: None,
            disposer: None,
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            kind: ClassKind::Interface,
            ..Self::concrete(name)
        }
    }

    /// Set the parent class (or parent interface)
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    pub fn worker_scoped(self) -> Self {
        self.implements(WORKER_SCOPE_MARKER)
    }

    pub fn task_scoped(self) -> Self {
        self.implements(TASK_SCOPE_MARKER)
    }

    /// Declare the constructor with its full parameter list
    pub fn constructor(mut self, params: Vec<ConstructorParameter>) -> Self {
        self.params = Some(params);
        self
    }

    /// Append one parameter, declaring the constructor if needed
    pub fn param(mut self, param: ConstructorParameter) -> Self {
        self.params.get_or_insert_with(Vec::new).push(param);
        self
    }

    pub fn factory<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Arguments) -> Result<T, CoreError> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(move |args: &Arguments| {
            factory(args).map(|value| Arc::new(value) as AnyArc)
        }));
        self
    }

    /// Run [`Dispose::dispose`] on instances of `T` during teardown
    pub fn disposable<T: Dispose>(mut self) -> Self {
        self.disposer = Some(Arc::new(|instance: &Instance| {
            match instance.downcast_ref::<T>() {
                Some(value) => value.dispose(),
                None => Ok(()),
            }
        }));
        self
    }

    pub fn with_disposer<F>(mut self, disposer: F) -> Self
    where
        F: Fn(&Instance) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        self.disposer = Some(Arc::new(disposer));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn interfaces(&self) -> &[String] {
        &self.implements
    }

    /// Parameters of this class's own constructor, if it declares one
    pub fn own_params(&self) -> Option<&[ConstructorParameter]> {
        self.params.as_deref()
    }

    pub fn factory_fn(&self) -> Option<&ClassFactory> {
        self.factory.as_ref()
    }

    pub fn disposer(&self) -> Option<&Disposer> {
        self.disposer.as_ref()
    }

    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    fn validate(&self) -> Result<(), CoreError> {
        if !matches!(TypeHint::classify(&self.name), TypeHint::Named(_)) {
            return Err(CoreError::configuration(format!(
                "{} is a builtin type name and cannot be registered as a class",
                self.name
            )));
        }
        if self.is_interface() && self.factory.is_some() {
            return Err(CoreError::configuration(format!(
                "interface {} cannot have a factory",
                self.name
            )));
        }

        let params = self.params.as_deref().unwrap_or(&[]);
        let mut seen = HashSet::new();
        for (index, param) in params.iter().enumerate() {
            if !seen.insert(param.name.as_str()) {
                return Err(CoreError::configuration(format!(
                    "duplicate constructor parameter {} on {}",
                    param.name, self.name
                )));
            }
            if param.variadic && index + 1 != params.len() {
                return Err(CoreError::configuration(format!(
                    "variadic parameter {} on {} must be the last parameter",
                    param.name, self.name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("parent", &self.parent)
            .field("implements", &self.implements)
            .field("params", &self.params)
            .field("has_factory", &self.factory.is_some())
            .field("has_disposer", &self.disposer.is_some())
            .finish()
    }
}

/// All known classes, static factory methods and free functions
#[derive(Clone)]
pub struct TypeRegistry {
    classes: HashMap<String, ClassDescriptor>,
    static_methods: HashMap<(String, String), StaticCallable>,
    functions: HashMap<String, StaticCallable>,
}

impl TypeRegistry {
    /// Create a registry holding only the scope marker interfaces
    pub fn new() -> Self {
        let mut classes = HashMap::new();
        for marker in [WORKER_SCOPE_MARKER, TASK_SCOPE_MARKER] {
            classes.insert(marker.to_string(), ClassDescriptor::interface(marker));
        }
        Self {
            classes,
            static_methods: HashMap::new(),
            functions: HashMap::new(),
        }
    }

    pub fn register(&mut self, descriptor: ClassDescriptor) -> Result<(), CoreError> {
        descriptor.validate()?;
        if self.classes.contains_key(descriptor.name()) {
            return Err(CoreError::configuration(format!(
                "class {} is already registered",
                descriptor.name()
            )));
        }
        self.classes.insert(descriptor.name().to_string(), descriptor);
        Ok(())
    }

    pub fn with_class(mut self, descriptor: ClassDescriptor) -> Result<Self, CoreError> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Register a zero-argument static factory method, addressed as `[class, method]`
    pub fn register_static_method<F>(&mut self, class: &str, method: &str, f: F)
    where
        F: Fn() -> Result<Value, CoreError> + Send + Sync + 'static,
    {
        self.static_methods
            .insert((class.to_string(), method.to_string()), Arc::new(f));
    }

    /// Register a zero-argument free function, addressed by name
    pub fn register_function<F>(&mut self, name: &str, f: F)
    where
        F: Fn() -> Result<Value, CoreError> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(f));
    }

    pub fn class(&self, name: &str) -> Option<&ClassDescriptor> {
        self.classes.get(name)
    }

    pub fn contains_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// A registered class that is not an interface
    pub fn is_concrete(&self, name: &str) -> bool {
        self.class(name).map_or(false, |c| !c.is_interface())
    }

    pub fn static_method(&self, class: &str, method: &str) -> Option<&StaticCallable> {
        self.static_methods
            .get(&(class.to_string(), method.to_string()))
    }

    pub fn function(&self, name: &str) -> Option<&StaticCallable> {
        self.functions.get(name)
    }

    /// Check whether `class` is `target`, extends it, or implements it
    pub fn is_assignable(&self, class: &str, target: &str) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([class.to_string()]);

        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(descriptor) = self.class(&current) {
                if let Some(parent) = descriptor.parent() {
                    queue.push_back(parent.to_string());
                }
                queue.extend(descriptor.interfaces().iter().cloned());
            }
        }
        false
    }

    /// Constructor of the class or its nearest ancestor declaring one
    pub fn constructor_params(&self, class: &str) -> &[ConstructorParameter] {
        let mut visited = HashSet::new();
        let mut current = self.class(class);

        while let Some(descriptor) = current {
            if !visited.insert(descriptor.name()) {
                break;
            }
            if let Some(params) = descriptor.own_params() {
                return params;
            }
            current = descriptor.parent().and_then(|parent| self.class(parent));
        }
        &[]
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("classes", &self.classes.len())
            .field("static_methods", &self.static_methods.len())
            .field("functions", &self.functions.len())
            .finish()
    }
}
