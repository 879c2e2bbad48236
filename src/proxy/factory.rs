//! The abstract factory behind proxied service names.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::cache::ProxyDefinitionCache;
use super::generator::{ProxyDefinition, ProxyGenerator};
use super::loader::{InMemoryProxyLoader, ProxyLoader};
use super::service_proxy::{LazyInit, ProxyInitializer, ServiceProxy};
use super::target::ProxyTarget;
use crate::error::{DiError, DiResult};
use crate::instance::Instance;
use crate::name::ServiceName;
use crate::registration::AbstractFactory;
use crate::registry::{ServiceRegistry, WeakRegistry};

/// Builds [`ServiceProxy`] stand-ins for services marked as proxied.
///
/// The first time a requested name is seen the real service is built right
/// away, its shape is turned into a proxy definition, and the proxy type is
/// remembered in the [`ProxyDefinitionCache`]. The proxy returned on that
/// first run is already initialized. Every later `create` finds the cached
/// type and returns a lazy proxy that builds the real service through
/// [`ServiceRegistry::create_real`] on first use.
///
/// # Examples
///
/// ```
/// use lazy_locator::proxy::{ClassShape, MethodShape, ProxyTarget, ServiceProxy, ServiceProxyFactory};
/// use lazy_locator::{DiResult, Instance, ServiceRegistry};
/// use serde_json::Value;
///
/// #[derive(Clone)]
/// struct Report;
///
/// impl ProxyTarget for Report {
///     fn shape(&self) -> ClassShape {
///         ClassShape::class("Report").method(MethodShape::public("title"))
///     }
///     fn invoke(&self, _method: &str, _args: &[Value]) -> DiResult<Value> {
///         Ok(Value::from("quarterly"))
///     }
/// }
///
/// let registry = ServiceRegistry::new();
/// ServiceProxyFactory::in_memory().register_as_default(&registry).unwrap();
/// registry.set_factory("report", |_| Ok(Instance::target(Report))).unwrap();
/// registry.set_proxy_service("report", None);
///
/// // first run primes the cache, the second is lazy
/// registry.create("report").unwrap();
/// let proxy = registry.create("report").unwrap().downcast::<ServiceProxy>().unwrap();
/// assert!(!proxy.is_initialized());
/// assert_eq!(proxy.call("title", vec![]).unwrap(), "quarterly");
/// assert!(proxy.is_initialized());
/// ```
#[derive(Clone)]
pub struct ServiceProxyFactory {
    cache: ProxyDefinitionCache,
    generator: ProxyGenerator,
    loader: Arc<dyn ProxyLoader>,
}

impl ServiceProxyFactory {
    pub fn new(cache: ProxyDefinitionCache, generator: ProxyGenerator, loader: Arc<dyn ProxyLoader>) -> Self {
        Self {
            cache,
            generator,
            loader,
        }
    }

    /// Memory cache, default generator and in-memory loader.
    pub fn in_memory() -> Self {
        Self::new(
            ProxyDefinitionCache::in_memory(),
            ProxyGenerator::default(),
            Arc::new(InMemoryProxyLoader::new()),
        )
    }

    pub fn cache(&self) -> &ProxyDefinitionCache {
        &self.cache
    }

    pub fn generator(&self) -> &ProxyGenerator {
        &self.generator
    }

    pub fn loader(&self) -> &Arc<dyn ProxyLoader> {
        &self.loader
    }

    /// Binds this factory under the registry's default proxy factory name.
    pub fn register_as_default(self, registry: &ServiceRegistry) -> DiResult<()> {
        let name = registry.default_proxy_factory();
        self.register_as(registry, &name)
    }

    /// Binds this factory under `name`, for use as an explicit factory in
    /// [`ServiceRegistry::set_proxy_service`].
    pub fn register_as(self, registry: &ServiceRegistry, name: &str) -> DiResult<()> {
        let factory: Arc<dyn AbstractFactory> = Arc::new(self);
        registry.set_service(name, Instance::shared(factory))
    }

    /// Looks up a previously generated definition for `requested`. A cache
    /// entry whose proxy type no longer loads counts as a miss.
    fn cached_definition(&self, requested: &str) -> DiResult<Option<Arc<ProxyDefinition>>> {
        let Some(proxy_type) = self.cache.get(requested)? else {
            return Ok(None);
        };
        match self.loader.find(&proxy_type) {
            Some(definition) => {
                debug!(service = requested, proxy_type = %proxy_type, "proxy definition cache hit");
                Ok(Some(definition))
            }
            None => {
                warn!(service = requested, proxy_type = %proxy_type, "cached proxy type cannot be loaded, regenerating");
                Ok(None)
            }
        }
    }
}

impl fmt::Debug for ServiceProxyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxyFactory")
            .field("generator", &self.generator)
            .finish()
    }
}

impl AbstractFactory for ServiceProxyFactory {
    fn can_create(&self, registry: &ServiceRegistry, canonical: &str, _requested: &str) -> bool {
        registry.proxy_services().contains_key(canonical)
    }

    fn create_with_name(&self, registry: &ServiceRegistry, canonical: &str, requested: &str) -> DiResult<Instance> {
        if let Some(definition) = self.cached_definition(requested)? {
            let initializer = lazy_initializer(registry.downgrade(), canonical, requested);
            return Ok(Instance::target(ServiceProxy::lazy(definition, initializer)));
        }

        let real = registry.create_real(ServiceName::pair(canonical, requested))?;
        let target = introspectable(&real)?;
        let definition = self.generator.generate(&target.shape())?;
        let definition = self.loader.load(&definition)?;
        self.cache.set(requested, &definition.proxy_type)?;

        Ok(Instance::target(ServiceProxy::initialized(definition, target)))
    }
}

fn introspectable(instance: &Instance) -> DiResult<Arc<dyn ProxyTarget>> {
    instance.as_target().ok_or_else(|| DiError::TypeResolution {
        type_name: instance.type_name().to_string(),
        reason: "service cannot be introspected".to_string(),
    })
}

fn lazy_initializer(registry: WeakRegistry, canonical: &str, requested: &str) -> ProxyInitializer {
    let name = ServiceName::pair(canonical, requested);
    Arc::new(move |init: &LazyInit<'_>| {
        let registry = registry
            .upgrade()
            .ok_or_else(|| DiError::not_created(name.requested(), "registry was dropped"))?;
        debug!(service = %name, method = init.method, "initializing lazy proxy");
        let real = registry.create_real(&name)?;
        introspectable(&real)
    })
}
