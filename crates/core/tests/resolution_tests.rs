//! Integration tests for definition-driven resolution
//!
//! Covers argument binding (literals, defaults, static factory methods,
//! functions, callables, variadics, service references), cycle detection,
//! instance sharing and the error surface of `Container::get`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tessera_core::container::{ClassDescriptor, ConstructorParameter, DefinitionTable, TypeRegistry};
use tessera_core::{
    Callable, Container, ContainerBuilder, ContainerConfig, CoreError, ErrorKind, ExecutionContext,
    Value,
};

struct Alpha {
    beta: Arc<Beta>,
}

struct Beta;

struct Counter {
    n: i64,
}

struct Greeter {
    greeting: String,
}

struct Zoned {
    zone: String,
}

struct Server {
    port: i64,
}

struct Pipeline {
    stages: Vec<String>,
}

struct Scheduler {
    job_result: i64,
}

struct Ratio {
    r: f64,
}

struct RedisCache;

struct Clock;

struct Repository {
    cache_class: String,
}

struct Reporter {
    clock: Arc<Clock>,
}

fn types() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    let classes = vec![
        ClassDescriptor::concrete("Alpha")
            .param(ConstructorParameter::typed("b", "Beta"))
            .factory(|args| {
                Ok(Alpha {
                    beta: args.object::<Beta>("b")?,
                })
            }),
        ClassDescriptor::concrete("Beta").factory(|_| Ok(Beta)),
        ClassDescriptor::concrete("Counter")
            .param(ConstructorParameter::typed("n", "int"))
            .factory(|args| Ok(Counter { n: args.int("n")? })),
        ClassDescriptor::concrete("Greeter")
            .param(ConstructorParameter::typed("greeting", "string").with_default("hello"))
            .factory(|args| {
                Ok(Greeter {
                    greeting: args.string("greeting")?.to_string(),
                })
            }),
        ClassDescriptor::concrete("Zoned")
            .param(ConstructorParameter::typed("zone", "string"))
            .factory(|args| {
                Ok(Zoned {
                    zone: args.string("zone")?.to_string(),
                })
            }),
        ClassDescriptor::concrete("Server")
            .param(ConstructorParameter::typed("port", "int"))
            .factory(|args| Ok(Server { port: args.int("port")? })),
        ClassDescriptor::concrete("Pipeline")
            .param(ConstructorParameter::typed("stages", "string").variadic())
            .factory(|args| {
                let stages = args
                    .rest("stages")
                    .iter()
                    .map(|v| v.as_str().map(String::from))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| CoreError::configuration("stage names must be strings"))?;
                Ok(Pipeline { stages })
            }),
        ClassDescriptor::concrete("Scheduler")
            .param(ConstructorParameter::typed("job", "callable"))
            .factory(|args| {
                let job_result = args
                    .callable("job")?
                    .call()?
                    .as_int()
                    .ok_or_else(|| CoreError::configuration("job must return an int"))?;
                Ok(Scheduler { job_result })
            }),
        ClassDescriptor::concrete("Ratio")
            .param(ConstructorParameter::typed("r", "float"))
            .factory(|args| Ok(Ratio { r: args.float("r")? })),
        ClassDescriptor::interface("Cache"),
        ClassDescriptor::concrete("RedisCache")
            .implements("Cache")
            .factory(|_| Ok(RedisCache)),
        ClassDescriptor::concrete("Clock").factory(|_| Ok(Clock)),
        ClassDescriptor::concrete("Repository")
            .param(ConstructorParameter::typed("cache", "Cache"))
            .factory(|args| {
                Ok(Repository {
                    cache_class: args.instance("cache")?.class_name().to_string(),
                })
            }),
        ClassDescriptor::concrete("Reporter")
            .param(ConstructorParameter::typed("clock", "Clock"))
            .factory(|args| {
                Ok(Reporter {
                    clock: args.object::<Clock>("clock")?,
                })
            }),
        ClassDescriptor::concrete("NodeOne")
            .param(ConstructorParameter::typed("next", "NodeTwo"))
            .factory(|_| Ok(())),
        ClassDescriptor::concrete("NodeTwo")
            .param(ConstructorParameter::typed("back", "NodeOne"))
            .factory(|_| Ok(())),
        ClassDescriptor::concrete("Broken").factory(|_| -> Result<(), CoreError> {
            Err(CoreError::configuration("database unreachable"))
        }),
        ClassDescriptor::concrete("Mystery")
            .param(ConstructorParameter::typed("thing", "Unknown"))
            .factory(|_| Ok(())),
        ClassDescriptor::concrete("Loose")
            .param(ConstructorParameter::typed("anything", "mixed"))
            .factory(|_| Ok(())),
    ];
    for class in classes {
        types.register(class).unwrap();
    }

    types.register_static_method("Clock", "utc", || Ok(Value::from("UTC")));
    types.register_static_method("Jobs", "nightly", || {
        Ok(Value::Callable(Callable::new(|| Ok(Value::Int(7)))))
    });
    types.register(ClassDescriptor::concrete("Jobs")).unwrap();
    types.register_function("default_port", || Ok(Value::Int(8080)));
    types
}

fn container(definitions: serde_json::Value) -> Container {
    let table = DefinitionTable::from_value(definitions).unwrap();
    Container::new(table, types())
}

fn ctx() -> ExecutionContext {
    ExecutionContext::global()
}

#[test]
fn test_alpha_beta_example() {
    let container = container(json!({
        "A": {"class": "Alpha", "args": {"b": "B"}},
        "B": {"class": "Beta", "args": {}}
    }));

    let alpha = container.get_as::<Alpha>(&ctx(), "A").unwrap();
    let beta = container.get_as::<Beta>(&ctx(), "B").unwrap();
    assert!(Arc::ptr_eq(&alpha.beta, &beta));
}

#[test]
fn test_repeated_get_returns_same_instance() {
    let container = container(json!({"B": {"class": "Beta"}}));

    let first = container.get(&ctx(), "B").unwrap();
    let second = container.get(&ctx(), "B").unwrap();
    assert!(first.ptr_eq(&second));
}

#[test]
fn test_unknown_id_is_not_found() {
    let container = container(json!({"B": {"class": "Beta"}}));

    assert!(!container.has("Z"));
    let err = container.get(&ctx(), "Z").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!err.is_container_error());
}

#[test]
fn test_recursion_reports_stack() {
    let container = container(json!({
        "A": {"class": "NodeOne", "args": {"next": "B"}},
        "B": {"class": "NodeTwo", "args": {"back": "A"}}
    }));

    let err = container.get(&ctx(), "A").unwrap_err();
    assert!(err.is_recursion());
    let stack = err.resolution_stack().unwrap();
    assert!(stack.contains(&"A".to_string()));
    assert!(stack.contains(&"B".to_string()));
    assert!(err.to_string().contains("[A, B, A]"));

    // stacks were unwound; the same failure is reported again, not a stale one
    let again = container.get(&ctx(), "B").unwrap_err();
    assert_eq!(again.resolution_stack().unwrap(), &["B", "A", "B"].map(String::from)[..]);
}

/// Container holding a single definition under `id`
fn single(id: &str, definition: serde_json::Value) -> Container {
    let mut table = serde_json::Map::new();
    table.insert(id.to_string(), definition);
    container(serde_json::Value::Object(table))
}

#[test]
fn test_int_argument_validation() {
    let good = single("counter", json!({"class": "Counter", "args": {"n": 42}}));
    let counter = good.get_as::<Counter>(&ctx(), "counter").unwrap();
    assert_eq!(counter.n, 42);

    let bad = single("counter", json!({"class": "Counter", "args": {"n": "forty-two"}}));
    let err = bad.get(&ctx(), "counter").unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("wrong type for argument n"));

    let fractional = single("counter", json!({"class": "Counter", "args": {"n": 4.2}}));
    assert!(fractional.get(&ctx(), "counter").unwrap_err().is_configuration());
}

#[test]
fn test_default_used_when_arg_absent() {
    let plain = single("greeter", json!({"class": "Greeter"}));
    assert_eq!(plain.get_as::<Greeter>(&ctx(), "greeter").unwrap().greeting, "hello");

    let custom = single("greeter", json!({"class": "Greeter", "args": {"greeting": "hi"}}));
    assert_eq!(custom.get_as::<Greeter>(&ctx(), "greeter").unwrap().greeting, "hi");
}

#[test]
fn test_missing_required_argument() {
    let container = container(json!({"counter": {"class": "Counter"}}));

    let err = container.get(&ctx(), "counter").unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("argument n on dependency Counter is not defined"));
}

#[test]
fn test_excess_and_unknown_arguments() {
    let container = container(json!({
        "excess": {"class": "Beta", "args": {"x": 1}},
        "unknown": {"class": "Counter", "args": {"m": 1}}
    }));

    assert!(container.get(&ctx(), "excess").unwrap_err().is_configuration());
    assert!(container.get(&ctx(), "unknown").unwrap_err().is_configuration());
}

#[test]
fn test_static_factory_method_and_function() {
    let container = container(json!({
        "zoned": {"class": "Zoned", "args": {"zone": ["Clock", "utc"]}},
        "server": {"class": "Server", "args": {"port": "default_port"}}
    }));
    assert_eq!(container.get_as::<Zoned>(&ctx(), "zoned").unwrap().zone, "UTC");
    assert_eq!(container.get_as::<Server>(&ctx(), "server").unwrap().port, 8080);

    let wrong = single("server", json!({"class": "Server", "args": {"port": ["Clock", "utc"]}}));
    let err = wrong.get(&ctx(), "server").unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("wrong type for argument port"));
}

#[test]
fn test_variadic_arguments() {
    let staged = single(
        "pipeline",
        json!({"class": "Pipeline", "args": {"stages": ["parse", "check", "emit"]}}),
    );
    let pipeline = staged.get_as::<Pipeline>(&ctx(), "pipeline").unwrap();
    assert_eq!(pipeline.stages, vec!["parse", "check", "emit"]);

    let empty = single("pipeline", json!({"class": "Pipeline"}));
    assert!(empty.get_as::<Pipeline>(&ctx(), "pipeline").unwrap().stages.is_empty());
}

#[test]
fn test_callable_argument() {
    let scheduled = single(
        "scheduler",
        json!({"class": "Scheduler", "args": {"job": ["Jobs", "nightly"]}}),
    );
    assert_eq!(scheduled.get_as::<Scheduler>(&ctx(), "scheduler").unwrap().job_result, 7);

    let literal = single("scheduler", json!({"class": "Scheduler", "args": {"job": "not-callable"}}));
    let err = literal.get(&ctx(), "scheduler").unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("wrong type for argument job"));
}

#[test]
fn test_float_accepts_integer_literal() {
    let container = container(json!({"ratio": {"class": "Ratio", "args": {"r": 2}}}));
    assert_eq!(container.get_as::<Ratio>(&ctx(), "ratio").unwrap().r, 2.0);
}

fn repository_container(cache_arg: serde_json::Value) -> Container {
    container(json!({
        "cache": {"class": "RedisCache"},
        "clock": {"class": "Clock"},
        "repo": {"class": "Repository", "args": {"cache": cache_arg}}
    }))
}

#[test]
fn test_interface_parameter_requires_assignable_service() {
    let good = repository_container(json!("cache"));
    let repo = good.get_as::<Repository>(&ctx(), "repo").unwrap();
    assert_eq!(repo.cache_class, "RedisCache");

    let mismatched = repository_container(json!("clock"));
    let err = mismatched.get(&ctx(), "repo").unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("expected Cache, got Clock"));

    let unknown_factory = repository_container(json!(["Nowhere", "build"]));
    let err = unknown_factory.get(&ctx(), "repo").unwrap_err();
    assert!(err.to_string().contains("invalid callable"));
}

#[test]
fn test_class_name_as_nested_id() {
    let container = container(json!({
        "explicit": {"class": "Reporter", "args": {"clock": "Clock"}}
    }));

    assert!(!container.is_instantiated(&ctx(), "Clock"));
    container.get_as::<Reporter>(&ctx(), "explicit").unwrap();
    assert!(container.is_instantiated(&ctx(), "Clock"));
    assert_eq!(container.get_class_by_id("Clock").unwrap(), "Clock");
}

#[test]
fn test_autowiring_by_declared_type() {
    let container = container(json!({
        "clock": {"class": "Clock"},
        "reporter": {"class": "Reporter"}
    }));

    let clock = container.get_as::<Clock>(&ctx(), "clock").unwrap();
    let reporter = container.get_as::<Reporter>(&ctx(), "reporter").unwrap();
    assert!(Arc::ptr_eq(&reporter.clock, &clock));
}

#[test]
fn test_ids_sharing_a_class_share_one_instance() {
    let container = container(json!({
        "primary": {"class": "Beta"},
        "replica": {"class": "Beta"}
    }));

    let primary = container.get(&ctx(), "primary").unwrap();
    let replica = container.get(&ctx(), "replica").unwrap();
    assert!(primary.ptr_eq(&replica));
    assert_eq!(container.get_ids_by_class("Beta"), vec!["primary", "replica"]);
}

#[test]
fn test_unresolvable_types() {
    let container = container(json!({
        "ghost": {"class": "Ghost"},
        "mystery": {"class": "Mystery", "args": {"thing": "x"}},
        "loose": {"class": "Loose", "args": {"anything": 1}},
        "iface": {"class": "Cache"}
    }));

    for id in ["ghost", "mystery", "loose", "iface"] {
        let err = container.get(&ctx(), id).unwrap_err();
        assert!(err.is_configuration(), "{} should be a configuration error: {}", id, err);
    }
    assert!(container
        .get(&ctx(), "mystery")
        .unwrap_err()
        .to_string()
        .contains("is of type Unknown which is not found"));
}

#[test]
fn test_factory_failure_is_wrapped_and_does_not_poison() {
    let container = container(json!({
        "broken": {"class": "Broken"},
        "beta": {"class": "Beta"}
    }));

    let err = container.get(&ctx(), "broken").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Construction);
    assert!(err.to_string().contains("database unreachable"));

    assert!(container.get(&ctx(), "beta").is_ok());
    assert_eq!(container.get(&ctx(), "broken").unwrap_err().kind(), ErrorKind::Construction);
}

#[test]
fn test_depends_on_resolved_before_construction() {
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut types = TypeRegistry::new();
    for name in ["Warmup", "App"] {
        let order = order.clone();
        types
            .register(ClassDescriptor::concrete(name).factory(move |args| {
                order.lock().push(args.class_name().to_string());
                Ok(())
            }))
            .unwrap();
    }
    let table = DefinitionTable::from_value(json!({
        "app": {"class": "App", "depends_on": ["warmup"]},
        "warmup": {"class": "Warmup"}
    }))
    .unwrap();
    let container = Container::new(table, types);

    container.get(&ctx(), "app").unwrap();
    assert_eq!(*order.lock(), vec!["Warmup", "App"]);
    assert!(container.is_instantiated(&ctx(), "warmup"));
}

#[test]
fn test_depth_limit() {
    let mut types = TypeRegistry::new();
    types
        .register(
            ClassDescriptor::concrete("Layer")
                .param(ConstructorParameter::typed("next", "Layer").with_default(Value::Null))
                .factory(|_| Ok(())),
        )
        .unwrap();
    let table = DefinitionTable::from_value(json!({
        "l1": {"class": "Layer", "args": {"next": "l2"}},
        "l2": {"class": "Layer", "args": {"next": "l3"}},
        "l3": {"class": "Layer", "args": {"next": "l4"}}
    }))
    .unwrap();

    let container = ContainerBuilder::new()
        .with_definitions(table)
        .with_types(types)
        .with_config(ContainerConfig::new().with_max_resolution_depth(2))
        .build()
        .unwrap();

    let err = container.get(&ctx(), "l1").unwrap_err();
    assert!(matches!(err, CoreError::ResolutionDepthExceeded { depth: 2, .. }));
}

#[test]
fn test_error_hook_translates_boundary_errors() {
    let translated = Arc::new(AtomicUsize::new(0));
    let seen = translated.clone();

    let container = ContainerBuilder::new()
        .with_definitions(DefinitionTable::from_value(json!({"B": {"class": "Beta"}})).unwrap())
        .with_types(types())
        .with_error_hook(move |error| {
            seen.fetch_add(1, Ordering::SeqCst);
            if error.is_not_found() {
                CoreError::configuration(format!("app lookup failed: {}", error))
            } else {
                error
            }
        })
        .build()
        .unwrap();

    let err = container.get(&ctx(), "missing").unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("app lookup failed"));
    assert!(container.get(&ctx(), "B").is_ok());
    assert_eq!(translated.load(Ordering::SeqCst), 1);
}

#[test]
fn test_validate_depends_on() {
    let acyclic = container(json!({
        "a": {"class": "Beta", "depends_on": ["b"]},
        "b": {"class": "Beta", "depends_on": ["Clock"]}
    }));
    assert!(acyclic.validate().is_ok());

    let cyclic = container(json!({
        "a": {"class": "Beta", "depends_on": ["b"]},
        "b": {"class": "Beta", "depends_on": ["a"]}
    }));
    assert!(cyclic.validate().unwrap_err().is_recursion());

    let dangling = container(json!({"a": {"class": "Beta", "depends_on": ["nope"]}}));
    assert!(dangling.validate().unwrap_err().is_configuration());
}
