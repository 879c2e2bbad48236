//! The service registry.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::catalog::TypeCatalog;
use crate::error::{DiError, DiResult};
use crate::instance::{Instance, ObjectId};
use crate::interceptor::InterceptorHooks;
use crate::internal::{with_circular_catch, PeerWalk};
use crate::name::{canonicalize, ServiceName};
use crate::registration::{AbstractFactory, Binding, InstanceInitializer, ServiceFactory};
use crate::trace::{self, CallArg, CallFrame, RegistrarId};

mod context;

pub use context::ResolverContext;

/// Service name the default proxy factory is looked up under.
pub const DEFAULT_PROXY_FACTORY: &str = "lazy_locator::ServiceProxyFactory";

/// Construction-time options for a [`ServiceRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryOptions {
    /// Whether re-binding an existing name replaces it instead of failing.
    pub allow_override: bool,
    /// Whether services without an explicit [`set_shared`](ServiceRegistry::set_shared) are cached.
    pub share_by_default: bool,
    /// Factory service used for proxied names without an explicit factory.
    pub default_proxy_factory: String,
    /// Ask peer registries before local bindings.
    pub retrieve_from_peers_first: bool,
    /// Human-readable registry name shown in diagnostics.
    pub label: String,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            allow_override: false,
            share_by_default: true,
            default_proxy_factory: DEFAULT_PROXY_FACTORY.to_string(),
            retrieve_from_peers_first: false,
            label: "ServiceRegistry".to_string(),
        }
    }
}

/// Identity of a registry as seen by events and the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RegistrarRef {
    pub id: RegistrarId,
    pub label: String,
}

impl fmt::Display for RegistrarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.label, self.id.as_u64())
    }
}

/// Hooks called after a successful registry `get` or `create`.
pub type RegistryHooks = InterceptorHooks<ServiceRegistry>;

/// Name-based service locator with aliases, proxy markings and peering.
///
/// Names are canonicalized before every lookup, so `Mailer\Transport`,
/// `mailer-transport` and `mailertransport` all address the same binding.
/// Services are shared by default: the first `get` caches the instance and
/// later calls return it. `create` always builds a new instance, routing
/// through a proxy factory when the name is marked as proxied.
///
/// The registry is a cheap handle; clones share the same bindings.
///
/// # Thread Safety
///
/// Bindings and cached instances sit behind `parking_lot` locks that are
/// never held while a factory runs. Two threads racing to build the same
/// shared service may both construct it; the first stored instance wins and
/// is returned to both.
///
/// # Examples
///
/// ```
/// use lazy_locator::{Instance, ServiceRegistry};
///
/// struct Mailer;
///
/// let registry = ServiceRegistry::new();
/// registry.set_factory("Mailer\\Transport", |_| Ok(Instance::object(Mailer))).unwrap();
/// registry.set_alias("mailer", "mailer-transport").unwrap();
///
/// let a = registry.get("mailer").unwrap();
/// let b = registry.get("MAILER_TRANSPORT").unwrap();
/// assert!(a.ptr_eq(&b));
/// ```
pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    registrar: RegistrarRef,
    options: RwLock<RegistryOptions>,
    bindings: RwLock<HashMap<String, Binding>>,
    shared: RwLock<HashMap<String, bool>>,
    instances: Mutex<HashMap<String, Instance>>,
    proxy_services: RwLock<BTreeMap<String, Option<String>>>,
    abstract_factories: RwLock<Vec<Arc<dyn AbstractFactory>>>,
    initializers: RwLock<Vec<InstanceInitializer>>,
    peers: RwLock<Vec<ServiceRegistry>>,
    hooks: RwLock<Option<Arc<RegistryHooks>>>,
    catalog: Arc<TypeCatalog>,
}

impl Clone for ServiceRegistry {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("registrar", &self.inner.registrar)
            .field("bindings", &self.inner.bindings.read().len())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::with_options(RegistryOptions::default())
    }

    pub fn with_options(options: RegistryOptions) -> Self {
        Self::with_catalog(options, Arc::new(TypeCatalog::new()))
    }

    /// Builds a registry that instantiates invokables from `catalog`.
    pub fn with_catalog(options: RegistryOptions, catalog: Arc<TypeCatalog>) -> Self {
        let registrar = RegistrarRef {
            id: RegistrarId::next(),
            label: options.label.clone(),
        };
        Self {
            inner: Arc::new(RegistryInner {
                registrar,
                options: RwLock::new(options),
                bindings: RwLock::new(HashMap::new()),
                shared: RwLock::new(HashMap::new()),
                instances: Mutex::new(HashMap::new()),
                proxy_services: RwLock::new(BTreeMap::new()),
                abstract_factories: RwLock::new(Vec::new()),
                initializers: RwLock::new(Vec::new()),
                peers: RwLock::new(Vec::new()),
                hooks: RwLock::new(None),
                catalog,
            }),
        }
    }

    pub fn registrar(&self) -> &RegistrarRef {
        &self.inner.registrar
    }

    pub fn id(&self) -> RegistrarId {
        self.inner.registrar.id
    }

    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.inner.catalog
    }

    pub fn options(&self) -> RegistryOptions {
        self.inner.options.read().clone()
    }

    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &ServiceRegistry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ----- Binding -----

    /// Binds `name` to `binding`.
    ///
    /// Fails with [`DiError::NamingConflict`] when the name is already bound
    /// and overriding is disabled. An override drops any cached instance.
    pub fn bind(&self, name: &str, binding: Binding) -> DiResult<()> {
        let canonical = canonicalize(name);
        validate(name, &canonical, &binding)?;

        {
            let mut bindings = self.inner.bindings.write();
            if bindings.contains_key(&canonical) && !self.allow_override() {
                return Err(DiError::NamingConflict(name.to_string()));
            }
            debug!(registry = %self.inner.registrar, service = name, kind = binding.kind(), "binding service");
            bindings.insert(canonical.clone(), binding);
        }
        self.inner.instances.lock().remove(&canonical);
        Ok(())
    }

    pub fn set_service(&self, name: &str, instance: Instance) -> DiResult<()> {
        self.bind(name, Binding::Instance(instance))
    }

    pub fn set_factory<F>(&self, name: &str, factory: F) -> DiResult<()>
    where
        F: for<'a> Fn(&ResolverContext<'a>) -> DiResult<Instance> + Send + Sync + 'static,
    {
        self.bind(name, Binding::factory(factory))
    }

    pub fn set_factory_service(&self, name: &str, factory_service: &str) -> DiResult<()> {
        self.bind(name, Binding::FactoryService(factory_service.to_string()))
    }

    pub fn set_invokable(&self, name: &str, type_name: &str) -> DiResult<()> {
        self.bind(name, Binding::Invokable(type_name.to_string()))
    }

    pub fn set_alias(&self, alias: &str, target: &str) -> DiResult<()> {
        self.bind(alias, Binding::Alias(target.to_string()))
    }

    /// Controls whether `get` caches the service. Fails for unbound names.
    pub fn set_shared(&self, name: &str, shared: bool) -> DiResult<()> {
        let canonical = canonicalize(name);
        if !self.inner.bindings.read().contains_key(&canonical) {
            return Err(DiError::ServiceNotFound(name.to_string()));
        }
        self.inner.shared.write().insert(canonical, shared);
        Ok(())
    }

    pub fn is_shared(&self, name: &str) -> bool {
        let canonical = canonicalize(name);
        self.inner
            .shared
            .read()
            .get(&canonical)
            .copied()
            .unwrap_or_else(|| self.inner.options.read().share_by_default)
    }

    pub fn set_allow_override(&self, allow: bool) {
        self.inner.options.write().allow_override = allow;
    }

    pub fn allow_override(&self) -> bool {
        self.inner.options.read().allow_override
    }

    pub fn set_retrieve_from_peers_first(&self, first: bool) {
        self.inner.options.write().retrieve_from_peers_first = first;
    }

    /// Marks `name` so `create` and `get` route through a proxy factory.
    /// `None` uses the default proxy factory. Last write wins.
    pub fn set_proxy_service(&self, name: &str, factory: Option<&str>) {
        self.inner
            .proxy_services
            .write()
            .insert(canonicalize(name), factory.map(str::to_string));
    }

    /// Proxy markings by canonical name.
    pub fn proxy_services(&self) -> BTreeMap<String, Option<String>> {
        self.inner.proxy_services.read().clone()
    }

    pub fn set_default_proxy_factory(&self, factory: &str) {
        self.inner.options.write().default_proxy_factory = factory.to_string();
    }

    pub fn default_proxy_factory(&self) -> String {
        self.inner.options.read().default_proxy_factory.clone()
    }

    pub fn add_abstract_factory(&self, factory: Arc<dyn AbstractFactory>) {
        self.inner.abstract_factories.write().push(factory);
    }

    /// Registers a callback run on every instance this registry constructs.
    pub fn add_initializer<F>(&self, initializer: F)
    where
        F: Fn(&Instance, &ServiceRegistry) -> DiResult<()> + Send + Sync + 'static,
    {
        self.inner.initializers.write().push(Arc::new(initializer));
    }

    /// Forwards unresolved `get` requests to `peer`.
    ///
    /// Registries may peer each other; a lookup never asks the same registry
    /// twice for one name. An intercepted registry shares its hooks with the
    /// peer.
    pub fn add_peer(&self, peer: ServiceRegistry) {
        self.inner.peers.write().push(peer.clone());
        self.share_interceptors(&peer);
    }

    pub fn peers(&self) -> Vec<ServiceRegistry> {
        self.inner.peers.read().clone()
    }

    /// Installs post-call hooks on `get` and `create`, replacing any
    /// previous ones.
    pub fn intercept_with(&self, hooks: Arc<RegistryHooks>) {
        *self.inner.hooks.write() = Some(hooks);
    }

    pub fn is_intercepted(&self) -> bool {
        self.inner.hooks.read().is_some()
    }

    /// Installs this registry's hooks on `child` and, through it, on the
    /// child's peers. Registries that already have hooks keep them.
    ///
    /// Returns whether `child` picked up the hooks.
    pub fn share_interceptors(&self, child: &ServiceRegistry) -> bool {
        let Some(hooks) = self.inner.hooks.read().clone() else {
            return false;
        };
        {
            let mut child_hooks = child.inner.hooks.write();
            if child_hooks.is_some() {
                return false;
            }
            *child_hooks = Some(hooks);
        }
        debug!(registry = %self.inner.registrar, child = %child.inner.registrar, "sharing interceptors");
        for peer in child.peers() {
            child.share_interceptors(&peer);
        }
        true
    }

    pub fn clear_interceptors(&self) {
        *self.inner.hooks.write() = None;
    }

    /// Canonical names with a binding, sorted.
    pub fn registered_services(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.bindings.read().keys().cloned().collect();
        names.sort();
        names
    }

    // ----- Lookup -----

    /// Follows aliases from `canonical` to the name that is actually bound.
    pub fn resolve_alias(&self, canonical: &str) -> DiResult<String> {
        let bindings = self.inner.bindings.read();
        let mut current = canonical.to_string();
        let mut path = vec![current.clone()];
        let mut seen = HashSet::from([current.clone()]);

        while let Some(Binding::Alias(target)) = bindings.get(&current) {
            let next = canonicalize(target);
            path.push(next.clone());
            if !seen.insert(next.clone()) {
                return Err(DiError::CircularDependency(path));
            }
            current = next;
        }
        Ok(current)
    }

    /// Whether `name` can be resolved here or through a peer.
    pub fn has(&self, name: &str) -> bool {
        let requested = ServiceName::new(name);
        let Ok(canonical) = self.resolve_alias(requested.canonical()) else {
            return false;
        };
        if self.inner.instances.lock().contains_key(&canonical) {
            return true;
        }
        if self.can_create(&canonical, requested.requested()) {
            return true;
        }
        let Some(_walk) = PeerWalk::enter(self.id(), requested.canonical()) else {
            return false;
        };
        let peers = self.inner.peers.read().clone();
        peers.iter().any(|peer| peer.has(name))
    }

    /// Retrieves a service, building and caching it on first use.
    pub fn get(&self, name: impl Into<ServiceName>) -> DiResult<Instance> {
        let name = name.into();
        let _frame = trace::enter(CallFrame::registrar(self.id(), "get", &name));
        trace!(registry = %self.inner.registrar, service = %name, "get");

        let instance = self.get_impl(&name)?;
        self.fire_hooks("get", &name, &instance);
        Ok(instance)
    }

    fn get_impl(&self, name: &ServiceName) -> DiResult<Instance> {
        let canonical = self.resolve_alias(name.canonical())?;
        let peers_first = self.inner.options.read().retrieve_from_peers_first;

        if peers_first {
            if let Some(found) = self.get_from_peers(name)? {
                return Ok(found);
            }
        }

        // Fast path: check the cache without holding the lock across construction
        if let Some(cached) = self.inner.instances.lock().get(&canonical) {
            return Ok(cached.clone());
        }
        if let Some(Binding::Instance(instance)) = self.inner.bindings.read().get(&canonical) {
            return Ok(instance.clone());
        }

        if self.can_create(&canonical, name.requested()) {
            let resolved = ServiceName::pair(canonical.clone(), name.requested());
            let instance = self.create(resolved)?;

            if self.is_shared(&canonical) {
                // Double-checked insert
                let mut instances = self.inner.instances.lock();
                return Ok(instances.entry(canonical).or_insert(instance).clone());
            }
            return Ok(instance);
        }

        if !peers_first {
            if let Some(found) = self.get_from_peers(name)? {
                return Ok(found);
            }
        }

        Err(DiError::ServiceNotFound(name.requested().to_string()))
    }

    fn get_from_peers(&self, name: &ServiceName) -> DiResult<Option<Instance>> {
        let Some(_walk) = PeerWalk::enter(self.id(), name.canonical()) else {
            return Ok(None);
        };
        let peers = self.inner.peers.read().clone();
        for peer in peers {
            if !peer.has(name.requested()) {
                continue;
            }
            match peer.get(name.requested()) {
                Ok(instance) => return Ok(Some(instance)),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn can_create(&self, canonical: &str, requested: &str) -> bool {
        let bound = self.inner.bindings.read().contains_key(canonical);
        let proxied = self.inner.proxy_services.read().contains_key(canonical);
        bound || proxied || self.find_abstract_factory(canonical, requested).is_some()
    }

    fn find_abstract_factory(&self, canonical: &str, requested: &str) -> Option<Arc<dyn AbstractFactory>> {
        let factories = self.inner.abstract_factories.read().clone();
        factories
            .into_iter()
            .find(|factory| factory.can_create(self, canonical, requested))
    }

    /// Builds a new instance, through the proxy factory if `name` is marked
    /// as proxied.
    pub fn create(&self, name: impl Into<ServiceName>) -> DiResult<Instance> {
        let name = name.into();
        let _frame = trace::enter(CallFrame::registrar(self.id(), "create", &name));

        let instance = self.create_impl(&name)?;
        self.fire_hooks("create", &name, &instance);
        Ok(instance)
    }

    fn create_impl(&self, name: &ServiceName) -> DiResult<Instance> {
        let marking = self.inner.proxy_services.read().get(name.canonical()).cloned();

        match marking {
            Some(factory) => {
                let factory_name = factory.unwrap_or_else(|| self.default_proxy_factory());
                let proxy_factory = self
                    .get(factory_name.as_str())?
                    .downcast_shared::<dyn AbstractFactory>()
                    .ok_or_else(|| DiError::invalid_binding(&factory_name, "not an abstract factory"))?;
                debug!(service = %name, factory = %factory_name, "creating proxied service");
                proxy_factory.create_with_name(self, name.canonical(), name.requested())
            }
            None => self.create_real_impl(name),
        }
    }

    /// Builds the real instance, ignoring any proxy marking.
    ///
    /// Proxy factories call this to obtain the instance they wrap. The call
    /// is neither intercepted nor recorded.
    pub fn create_real(&self, name: impl Into<ServiceName>) -> DiResult<Instance> {
        let name = name.into();
        let _frame = trace::enter(CallFrame::registrar(self.id(), "create_real", &name));
        self.create_real_impl(&name)
    }

    fn create_real_impl(&self, name: &ServiceName) -> DiResult<Instance> {
        let canonical = self.resolve_alias(name.canonical())?;
        let resolved = ServiceName::pair(canonical.clone(), name.requested());

        with_circular_catch(self.id(), &canonical, name.requested(), || {
            let binding = self.inner.bindings.read().get(&canonical).cloned();

            let instance = match binding {
                Some(Binding::Instance(instance)) => return Ok(instance),
                Some(Binding::Factory(factory)) => factory(&ResolverContext::new(self, &resolved))?,
                Some(Binding::FactoryService(factory_name)) => {
                    let factory = self
                        .get(factory_name.as_str())?
                        .downcast_shared::<dyn ServiceFactory>()
                        .ok_or_else(|| DiError::invalid_binding(name.requested(), format!("{} is not a service factory", factory_name)))?;
                    factory.create_service(&ResolverContext::new(self, &resolved))?
                }
                Some(Binding::Invokable(type_name)) => self.inner.catalog.instantiate(&type_name)?,
                // resolve_alias never stops on an alias
                Some(Binding::Alias(target)) => return Err(DiError::ServiceNotFound(target)),
                None => match self.find_abstract_factory(&canonical, name.requested()) {
                    Some(factory) => factory.create_with_name(self, &canonical, name.requested())?,
                    None => return Err(DiError::ServiceNotFound(name.requested().to_string())),
                },
            };

            let initializers = self.inner.initializers.read().clone();
            for initializer in initializers {
                initializer(&instance, self)?;
            }
            Ok(instance)
        })
    }

    fn fire_hooks(&self, method: &str, name: &ServiceName, instance: &Instance) {
        let hooks = self.inner.hooks.read().clone();
        if let Some(hooks) = hooks {
            hooks.fire(self, method, &[CallArg::from(name)], instance);
        }
    }

    // ----- Typed helpers -----

    pub fn get_as<T: Any + Send + Sync>(&self, name: impl Into<ServiceName>) -> DiResult<Arc<T>> {
        let name = name.into();
        let requested = name.requested().to_string();
        self.get(name)?
            .downcast::<T>()
            .ok_or(DiError::TypeMismatch(requested))
    }

    pub fn get_shared<T: ?Sized + Send + Sync + 'static>(&self, name: impl Into<ServiceName>) -> DiResult<Arc<T>> {
        let name = name.into();
        let requested = name.requested().to_string();
        self.get(name)?
            .downcast_shared::<T>()
            .ok_or(DiError::TypeMismatch(requested))
    }

    /// Runs `f` with a consumer frame for `consumer` on the resolution
    /// context, so services pulled inside are attributed to it even when the
    /// consumer was built long before.
    pub fn on_behalf_of<R>(&self, consumer: ObjectId, function: &str, f: impl FnOnce(&ServiceRegistry) -> R) -> R {
        let _frame = trace::enter(CallFrame::consumer(consumer, true, function));
        f(self)
    }
}

fn validate(name: &str, canonical: &str, binding: &Binding) -> DiResult<()> {
    if canonical.is_empty() {
        return Err(DiError::invalid_binding(name, "service name is empty"));
    }
    match binding {
        Binding::Alias(target) if canonicalize(target).is_empty() => {
            Err(DiError::invalid_binding(name, "alias target is empty"))
        }
        Binding::Alias(target) if canonicalize(target) == canonical => {
            Err(DiError::invalid_binding(name, "alias points to itself"))
        }
        Binding::Invokable(type_name) | Binding::FactoryService(type_name) if type_name.trim().is_empty() => {
            Err(DiError::invalid_binding(name, format!("{} name is empty", binding.kind())))
        }
        _ => Ok(()),
    }
}

/// Non-owning registry handle, held by lazy proxies.
#[derive(Clone)]
pub struct WeakRegistry {
    inner: Weak<RegistryInner>,
}

impl WeakRegistry {
    pub fn upgrade(&self) -> Option<ServiceRegistry> {
        self.inner.upgrade().map(|inner| ServiceRegistry { inner })
    }
}

impl fmt::Debug for WeakRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRegistry")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
