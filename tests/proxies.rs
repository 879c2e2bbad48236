//! Lazy proxy behaviour: forwarding, property access, cloning, snapshots and
//! the proxy factory's cache.

use lazy_locator::proxy::{
    ClassShape, FileProxyLoader, InMemoryProxyLoader, JsonFileCache, LazyInit, MethodShape, ProxyDefinition,
    ProxyDefinitionCache, ProxyGenerator, ProxyInitializer, ProxyLoader, ProxySnapshot, ProxyTarget, ServiceProxy,
    ServiceProxyFactory,
};
use lazy_locator::{DiError, DiResult, Instance, RegistryOptions, ServiceRegistry, TypeCatalog};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

// ===== Test Services =====

#[derive(Debug, Default, Deserialize)]
#[serde(from = "LazyServiceState")]
struct LazyService {
    counter: AtomicU64,
    properties: Mutex<BTreeMap<String, Value>>,
}

#[derive(Deserialize)]
struct LazyServiceState {
    counter: u64,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
}

impl From<LazyServiceState> for LazyService {
    fn from(state: LazyServiceState) -> Self {
        Self {
            counter: AtomicU64::new(state.counter),
            properties: Mutex::new(state.properties),
        }
    }
}

impl Clone for LazyService {
    fn clone(&self) -> Self {
        Self {
            counter: AtomicU64::new(self.counter.load(Ordering::SeqCst)),
            properties: Mutex::new(self.properties.lock().clone()),
        }
    }
}

impl LazyService {
    fn count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl ProxyTarget for LazyService {
    fn shape(&self) -> ClassShape {
        ClassShape::class("tests::LazyService")
            .method(MethodShape::constructor("new"))
            .method(MethodShape::public("increment"))
            .method(MethodShape::public("count"))
            .method(
                MethodShape::public("greet")
                    .param("name")
                    .param_with_default("greeting", json!("hello")),
            )
            .method(MethodShape::public("reset").final_())
            .method(MethodShape::public("create").static_())
            .field("counter")
            .field("properties")
    }

    fn invoke(&self, method: &str, args: &[Value]) -> DiResult<Value> {
        match method {
            "increment" => Ok(json!(self.counter.fetch_add(1, Ordering::SeqCst) + 1)),
            "count" => Ok(json!(self.count())),
            "greet" => Ok(json!(format!(
                "{} {}",
                args[1].as_str().unwrap_or_default(),
                args[0].as_str().unwrap_or_default()
            ))),
            other => Err(DiError::UnknownMember {
                type_name: "tests::LazyService".into(),
                member: other.into(),
            }),
        }
    }

    fn get_property(&self, name: &str) -> DiResult<Option<Value>> {
        Ok(self.properties.lock().get(name).cloned())
    }

    fn set_property(&self, name: &str, value: Value) -> DiResult<()> {
        self.properties.lock().insert(name.to_string(), value);
        Ok(())
    }

    fn serialize_state(&self) -> Value {
        json!({ "counter": self.count(), "properties": *self.properties.lock() })
    }
}

/// Counts warnings logged by the proxy module.
struct WarnLayer(Arc<Mutex<Vec<String>>>);

impl<S: Subscriber> Layer<S> for WarnLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() == Level::WARN && metadata.target().starts_with("lazy_locator::proxy") {
            self.0.lock().push(metadata.target().to_string());
        }
    }
}

fn definition() -> Arc<ProxyDefinition> {
    let generator = ProxyGenerator::default();
    Arc::new(generator.generate(&LazyService::default().shape()).unwrap())
}

/// A lazy proxy over a shared `LazyService`, counting initializer runs.
fn lazy_proxy(service: Arc<LazyService>, runs: Arc<AtomicUsize>) -> ServiceProxy {
    let initializer: ProxyInitializer = Arc::new(move |_init: &LazyInit<'_>| {
        runs.fetch_add(1, Ordering::SeqCst);
        Ok(service.clone() as Arc<dyn ProxyTarget>)
    });
    ServiceProxy::lazy(definition(), initializer)
}

// ===== Forwarding =====

#[test]
fn test_generated_definition_forwards_public_instance_methods() {
    let def = definition();
    let names: Vec<_> = def.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["increment", "count", "greet"]);
    assert_eq!(def.proxy_type, "lazy_locator::proxies::__CG__::tests::LazyService");
    assert_eq!(def.excluded_fields, vec!["counter", "properties"]);
}

#[test]
fn test_first_call_initializes_then_delegates() {
    let runs = Arc::new(AtomicUsize::new(0));
    let service = Arc::new(LazyService::default());
    let proxy = lazy_proxy(service.clone(), runs.clone());

    assert!(!proxy.is_initialized());
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    assert_eq!(proxy.call("increment", vec![]).unwrap(), json!(1));
    assert_eq!(proxy.call("increment", vec![]).unwrap(), json!(2));
    assert!(proxy.is_initialized());
    assert!(!proxy.has_initializer());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(service.count(), 2);
}

#[test]
fn test_omitted_arguments_use_defaults() {
    let proxy = lazy_proxy(Arc::new(LazyService::default()), Arc::new(AtomicUsize::new(0)));

    assert_eq!(proxy.call("greet", vec![json!("world")]).unwrap(), json!("hello world"));
    assert_eq!(
        proxy.call("greet", vec![json!("world"), json!("bye")]).unwrap(),
        json!("bye world")
    );
}

#[test]
fn test_unknown_members_and_bad_arity_do_not_initialize() {
    let runs = Arc::new(AtomicUsize::new(0));
    let proxy = lazy_proxy(Arc::new(LazyService::default()), runs.clone());

    let err = proxy.call("reset", vec![]).unwrap_err();
    assert_eq!(err.to_string(), "Unknown member reset on tests::LazyService");

    let err = proxy.call("greet", vec![]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invocation of greet failed: takes at least 1 argument(s), 0 given"
    );

    let err = proxy.call("count", vec![json!(1)]).unwrap_err();
    assert!(matches!(err, DiError::Invocation { .. }));

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(!proxy.is_initialized());
}

#[test]
fn test_failed_initializer_is_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let initializer: ProxyInitializer = Arc::new(move |_init: &LazyInit<'_>| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(DiError::not_created("lazy", "database offline"));
        }
        Ok(Arc::new(LazyService::default()) as Arc<dyn ProxyTarget>)
    });
    let proxy = ServiceProxy::lazy(definition(), initializer);

    assert!(proxy.call("count", vec![]).is_err());
    assert!(proxy.has_initializer());
    assert_eq!(proxy.call("count", vec![]).unwrap(), json!(0));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_initializer_sees_the_triggering_call() {
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let initializer: ProxyInitializer = Arc::new(move |init: &LazyInit<'_>| {
        *sink.lock() = Some((init.method.to_string(), init.args.to_vec(), init.proxy.is_initialized()));
        Ok(Arc::new(LazyService::default()) as Arc<dyn ProxyTarget>)
    });
    let proxy = ServiceProxy::lazy(definition(), initializer);

    proxy.call("greet", vec![json!("you")]).unwrap();
    assert_eq!(
        seen.lock().clone(),
        Some(("greet".to_string(), vec![json!("you"), json!("hello")], false))
    );
}

#[test]
fn test_with_target_downcasts_the_wrapped_instance() {
    let proxy = lazy_proxy(Arc::new(LazyService::default()), Arc::new(AtomicUsize::new(0)));
    proxy.call("increment", vec![]).unwrap();

    assert_eq!(proxy.with_target(|s: &LazyService| s.count()).unwrap(), 1);
    assert!(matches!(
        proxy.with_target(|_: &ServiceProxy| ()),
        Err(DiError::TypeMismatch(_))
    ));
}

// ===== Property access =====

#[test]
fn test_property_read_initializes_exactly_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let service = Arc::new(LazyService::default());
    service.set_property("checked_property", json!("checkedValue")).unwrap();
    let proxy = lazy_proxy(service, runs.clone());

    assert_eq!(proxy.get_property("checked_property").unwrap(), Some(json!("checkedValue")));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(proxy.get_property("checked_property").unwrap(), Some(json!("checkedValue")));
    assert!(proxy.has_property("checked_property").unwrap());
    assert!(!proxy.has_property("missing").unwrap());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_property_write_reaches_the_wrapped_instance() {
    let service = Arc::new(LazyService::default());
    let proxy = lazy_proxy(service.clone(), Arc::new(AtomicUsize::new(0)));

    proxy.set_property("dynamic", json!(42)).unwrap();
    assert!(proxy.is_initialized());
    assert_eq!(service.get_property("dynamic").unwrap(), Some(json!(42)));
}

// ===== Cloning =====

#[test]
fn test_cloning_an_initialized_proxy_deep_copies() {
    let service = Arc::new(LazyService::default());
    let proxy = lazy_proxy(service.clone(), Arc::new(AtomicUsize::new(0)));
    proxy.call("increment", vec![]).unwrap();

    let copy = proxy.clone();
    assert!(copy.is_initialized());
    copy.call("increment", vec![]).unwrap();
    copy.call("increment", vec![]).unwrap();

    assert_eq!(proxy.call("count", vec![]).unwrap(), json!(1));
    assert_eq!(copy.call("count", vec![]).unwrap(), json!(3));
    assert_eq!(service.count(), 1);
}

#[test]
fn test_cloning_an_uninitialized_proxy_stays_lazy() {
    let runs = Arc::new(AtomicUsize::new(0));
    let service = Arc::new(LazyService::default());
    let proxy = lazy_proxy(service.clone(), runs.clone());

    let copy = proxy.clone();
    assert!(!copy.is_initialized());
    assert!(!proxy.is_initialized());
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    copy.call("increment", vec![]).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(!proxy.is_initialized());

    // the clone works on its own copy
    assert_eq!(service.count(), 0);
    proxy.call("increment", vec![]).unwrap();
    assert_eq!(service.count(), 1);
    assert_eq!(copy.call("count", vec![]).unwrap(), json!(1));
}

#[test]
fn test_clone_during_initialization_waits_for_the_wrapped_instance() {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let started_tx = Mutex::new(started_tx);
    let release_rx = Mutex::new(release_rx);
    let service = Arc::new(LazyService::default());

    let initializer: ProxyInitializer = Arc::new(move |_init: &LazyInit<'_>| {
        started_tx.lock().send(()).unwrap();
        release_rx.lock().recv().unwrap();
        Ok(service.clone() as Arc<dyn ProxyTarget>)
    });
    let proxy = ServiceProxy::lazy(definition(), initializer);

    let copy = thread::scope(|s| {
        let first_call = s.spawn(|| proxy.call("count", vec![]));
        started_rx.recv().unwrap();

        let cloning = s.spawn(|| proxy.clone());
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        first_call.join().unwrap().unwrap();
        cloning.join().unwrap()
    });

    assert!(copy.is_initialized());
    copy.call("increment", vec![]).unwrap();
    assert_eq!(copy.call("count", vec![]).unwrap(), json!(1));
    assert_eq!(proxy.call("count", vec![]).unwrap(), json!(0));
}

// ===== Snapshots =====

fn catalog() -> TypeCatalog {
    let catalog = TypeCatalog::new();
    catalog.register_target("tests::LazyService", LazyService::default);
    catalog
}

#[test]
fn test_snapshot_initializes_and_keeps_only_flag_and_state() {
    let runs = Arc::new(AtomicUsize::new(0));
    let service = Arc::new(LazyService::default());
    service.counter.store(5, Ordering::SeqCst);
    let proxy = lazy_proxy(service, runs.clone());

    let snapshot = proxy.snapshot().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(snapshot.initialized);
    assert_eq!(snapshot.wrapped["counter"], json!(5));

    let json = serde_json::to_value(&proxy).unwrap();
    assert_eq!(
        json.as_object().unwrap().keys().collect::<Vec<_>>(),
        vec!["initialized", "proxy_type", "wrapped"]
    );
}

#[test]
fn test_restored_proxy_is_a_detached_copy() {
    let service = Arc::new(LazyService::default());
    let proxy = lazy_proxy(service.clone(), Arc::new(AtomicUsize::new(0)));
    let loader = InMemoryProxyLoader::new();
    loader.load(proxy.definition()).unwrap();

    let json = serde_json::to_string(&proxy).unwrap();
    let snapshot: ProxySnapshot = serde_json::from_str(&json).unwrap();
    let restored = snapshot.restore(&catalog(), &loader).unwrap();
    assert!(snapshot.initialized);
    assert!(!restored.is_initialized());

    service.counter.store(10, Ordering::SeqCst);
    assert_eq!(restored.call("count", vec![]).unwrap(), json!(0));
    assert!(!restored.has_initializer());
}

#[test]
fn test_failed_state_capture_is_null_and_logged() {
    let warnings = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(WarnLayer(warnings.clone()));

    let initializer: ProxyInitializer = Arc::new(|_init: &LazyInit<'_>| -> DiResult<Arc<dyn ProxyTarget>> {
        Err(DiError::ServiceNotFound("backend".into()))
    });
    let proxy = ServiceProxy::lazy(definition(), initializer);

    let state = tracing::subscriber::with_default(subscriber, || proxy.serialize_state());

    assert_eq!(state, Value::Null);
    assert_eq!(warnings.lock().len(), 1);
    assert!(proxy.has_initializer());
}

#[test]
fn test_restore_needs_a_loaded_definition() {
    let proxy = lazy_proxy(Arc::new(LazyService::default()), Arc::new(AtomicUsize::new(0)));
    let snapshot = proxy.snapshot().unwrap();

    let err = snapshot.restore(&catalog(), &InMemoryProxyLoader::new()).unwrap_err();
    assert!(matches!(err, DiError::TypeResolution { .. }));
}

// ===== Proxy factory =====

fn proxied_registry(factory: ServiceProxyFactory, built: Arc<AtomicUsize>) -> ServiceRegistry {
    let registry = ServiceRegistry::new();
    factory.register_as_default(&registry).unwrap();
    registry
        .set_factory("lazy\\service", move |_| {
            built.fetch_add(1, Ordering::SeqCst);
            Ok(Instance::target(LazyService::default()))
        })
        .unwrap();
    registry.set_proxy_service("lazy\\service", None);
    registry
}

#[test]
fn test_create_real_never_returns_a_proxy() {
    let registry = proxied_registry(ServiceProxyFactory::in_memory(), Arc::new(AtomicUsize::new(0)));

    let real = registry.create_real("lazy\\service").unwrap();
    assert!(real.is::<LazyService>());

    let proxied = registry.create("lazy\\service").unwrap();
    assert!(proxied.is::<ServiceProxy>());
}

#[test]
fn test_lazy_proxy_delegate_matches_create_real() {
    let built = Arc::new(AtomicUsize::new(0));
    let registry = proxied_registry(ServiceProxyFactory::in_memory(), built.clone());

    registry.create("lazy\\service").unwrap();
    let lazy = registry
        .create("lazy\\service")
        .unwrap()
        .downcast::<ServiceProxy>()
        .unwrap();
    assert!(!lazy.is_initialized());
    assert_eq!(built.load(Ordering::SeqCst), 1);

    let wrapped = lazy.target().unwrap();
    assert!(wrapped.as_any().is::<LazyService>());
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[test]
fn test_shared_proxied_service_is_cached_as_the_proxy() {
    let registry = proxied_registry(ServiceProxyFactory::in_memory(), Arc::new(AtomicUsize::new(0)));

    let a = registry.get("lazy\\service").unwrap();
    let b = registry.get("LAZY_SERVICE").unwrap();
    assert!(a.ptr_eq(&b));
    assert!(a.is::<ServiceProxy>());
}

#[test]
fn test_explicit_proxy_factory_is_used() {
    let built = Arc::new(AtomicUsize::new(0));
    let registry = proxied_registry(ServiceProxyFactory::in_memory(), built);
    let custom = ServiceProxyFactory::in_memory();
    let cache = custom.cache().clone();
    custom.register_as(&registry, "custom-proxies").unwrap();
    registry.set_proxy_service("lazy\\service", Some("custom-proxies"));

    registry.create("lazy\\service").unwrap();
    assert!(cache.get("lazy\\service").unwrap().is_some());
}

#[test]
fn test_missing_proxy_factory_is_not_found() {
    let registry = ServiceRegistry::with_options(RegistryOptions {
        default_proxy_factory: "nowhere".to_string(),
        ..RegistryOptions::default()
    });
    registry.set_factory("svc", |_| Ok(Instance::target(LazyService::default()))).unwrap();
    registry.set_proxy_service("svc", None);

    assert!(matches!(registry.create("svc"), Err(DiError::ServiceNotFound(name)) if name == "nowhere"));
}

#[test]
fn test_proxy_definitions_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let cache_file = dir.path().join("proxy-cache.json");
    let factory = || {
        let generator = ProxyGenerator::new("tests::proxies", dir.path());
        ServiceProxyFactory::new(
            ProxyDefinitionCache::new(Arc::new(JsonFileCache::open(&cache_file).unwrap())),
            generator.clone(),
            Arc::new(FileProxyLoader::new(generator)) as Arc<dyn ProxyLoader>,
        )
    };

    let built = Arc::new(AtomicUsize::new(0));
    let first = proxied_registry(factory(), built.clone());
    let proxy = first.create("lazy\\service").unwrap().downcast::<ServiceProxy>().unwrap();
    assert!(proxy.is_initialized());
    assert!(dir.path().join("__CG__tests.LazyService.json").exists());

    // a new process: fresh registry, fresh factory, same files
    let second = proxied_registry(factory(), built.clone());
    let proxy = second.create("lazy\\service").unwrap().downcast::<ServiceProxy>().unwrap();
    assert!(!proxy.is_initialized());
    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(proxy.call("increment", vec![]).unwrap(), json!(1));
}
