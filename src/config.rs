//! Configuration and bootstrapping.
//!
//! [`LocatorConfig`] is read from JSON and can be overridden from the
//! environment with the `LAZY_LOCATOR_` prefix:
//!
//! | variable | field |
//! |---|---|
//! | `LAZY_LOCATOR_LOGGED_SERVICE_MANAGER` | `logged_service_manager` |
//! | `LAZY_LOCATOR_DIAGNOSTICS_ENABLED` | `diagnostics_enabled` |
//! | `LAZY_LOCATOR_SERVICE_PROXIES_NAMESPACE` | `service_proxies_namespace` |
//! | `LAZY_LOCATOR_SERVICE_PROXIES_DIR` | `service_proxies_dir` |
//! | `LAZY_LOCATOR_SERVICE_PROXIES_CACHE` | `service_proxies_cache` |
//! | `LAZY_LOCATOR_ALLOW_OVERRIDE` | `allow_override` |
//!
//! [`bootstrap`] turns a config into a wired [`Locator`].

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DiError, DiResult};
use crate::events::{instrument, EventBus, EventManager, ListenerAggregate};
use crate::proxy::{
    FileProxyLoader, InMemoryProxyLoader, JsonFileCache, ProxyDefinitionCache, ProxyGenerator, ProxyLoader,
    ServiceProxyFactory, DEFAULT_PROXY_NAMESPACE,
};
use crate::recorder::CallGraphRecorder;
use crate::registry::{RegistryOptions, ServiceRegistry};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "LAZY_LOCATOR";

/// File the `file` proxy cache keeps its entries in, inside the proxy directory.
pub const PROXY_CACHE_FILE: &str = "proxy-cache.json";

/// Where proxy definition cache entries are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Lost on restart; every process starts with initialized proxies.
    #[default]
    Memory,
    /// A JSON file next to the generated definitions.
    File,
}

impl std::str::FromStr for CacheBackend {
    type Err = DiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "file" => Ok(CacheBackend::File),
            other => Err(DiError::Config(format!("unknown proxy cache backend \"{}\"", other))),
        }
    }
}

/// Locator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Instrument the registry and record its call graph.
    pub logged_service_manager: bool,
    /// Expose collected graphs to reporting surfaces.
    pub diagnostics_enabled: bool,
    pub service_proxies_namespace: String,
    pub service_proxies_dir: PathBuf,
    pub service_proxies_cache: CacheBackend,
    /// Names to proxy, each with an optional explicit proxy factory.
    pub lazy_services: BTreeMap<String, Option<String>>,
    pub allow_override: bool,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            logged_service_manager: true,
            diagnostics_enabled: true,
            service_proxies_namespace: DEFAULT_PROXY_NAMESPACE.to_string(),
            service_proxies_dir: env::current_dir()
                .unwrap_or_default()
                .join("data")
                .join("service-proxies"),
            service_proxies_cache: CacheBackend::Memory,
            lazy_services: BTreeMap::new(),
            allow_override: false,
        }
    }
}

impl LocatorConfig {
    pub fn from_json(json: &str) -> DiResult<Self> {
        serde_json::from_str(json).map_err(|e| DiError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> DiResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| DiError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Applies `LAZY_LOCATOR_*` overrides from the process environment.
    pub fn apply_env(self) -> DiResult<Self> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which receives full variable names.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> DiResult<Self> {
        let var = |key: &str| lookup(&format!("{}_{}", ENV_PREFIX, key.to_uppercase()));

        if let Some(value) = var("logged_service_manager") {
            self.logged_service_manager = parse_bool("logged_service_manager", &value)?;
        }
        if let Some(value) = var("diagnostics_enabled") {
            self.diagnostics_enabled = parse_bool("diagnostics_enabled", &value)?;
        }
        if let Some(value) = var("service_proxies_namespace") {
            self.service_proxies_namespace = value;
        }
        if let Some(value) = var("service_proxies_dir") {
            self.service_proxies_dir = PathBuf::from(value);
        }
        if let Some(value) = var("service_proxies_cache") {
            self.service_proxies_cache = value.parse()?;
        }
        if let Some(value) = var("allow_override") {
            self.allow_override = parse_bool("allow_override", &value)?;
        }
        Ok(self)
    }

    /// Marks `name` as lazy, optionally with an explicit proxy factory.
    pub fn lazy_service(mut self, name: impl Into<String>, factory: Option<&str>) -> Self {
        self.lazy_services.insert(name.into(), factory.map(str::to_string));
        self
    }
}

fn parse_bool(key: &str, value: &str) -> DiResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(DiError::Config(format!("{} expects a boolean, got \"{}\"", key, other))),
    }
}

/// A registry wired with proxying, events and recording.
#[derive(Clone)]
pub struct Locator {
    registry: ServiceRegistry,
    events: Arc<EventManager>,
    recorder: CallGraphRecorder,
    config: LocatorConfig,
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locator")
            .field("registry", &self.registry)
            .field("recorder", &self.recorder)
            .finish()
    }
}

impl Locator {
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn recorder(&self) -> &CallGraphRecorder {
        &self.recorder
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    pub fn diagnostics_enabled(&self) -> bool {
        self.config.diagnostics_enabled && self.config.logged_service_manager
    }

    /// Collector over this locator's recorder, disabled along with diagnostics.
    #[cfg(feature = "graph-export")]
    pub fn collector(&self) -> crate::collector::GraphCollector {
        if self.diagnostics_enabled() {
            crate::collector::GraphCollector::new(self.recorder.clone())
        } else {
            crate::collector::GraphCollector::disabled(self.recorder.clone())
        }
    }
}

/// Builds a [`Locator`] from `config`.
///
/// The default proxy factory is bound under the registry's default proxy
/// factory name and every lazy service is marked as proxied. With
/// `logged_service_manager` set the registry is instrumented and the
/// recorder listens on its events.
///
/// ```
/// use lazy_locator::config::{bootstrap, LocatorConfig};
/// use lazy_locator::Instance;
///
/// let locator = bootstrap(LocatorConfig::default()).unwrap();
/// locator.registry().set_factory("clock", |_| Ok(Instance::object(()))).unwrap();
/// locator.registry().get("clock").unwrap();
///
/// assert_eq!(locator.recorder().summary()["clock"].access_count, 2);
/// ```
pub fn bootstrap(config: LocatorConfig) -> DiResult<Locator> {
    let registry = ServiceRegistry::with_options(RegistryOptions {
        allow_override: config.allow_override,
        ..RegistryOptions::default()
    });

    let generator = ProxyGenerator::new(config.service_proxies_namespace.clone(), config.service_proxies_dir.clone());
    let (cache, loader): (ProxyDefinitionCache, Arc<dyn ProxyLoader>) = match config.service_proxies_cache {
        CacheBackend::Memory => (ProxyDefinitionCache::in_memory(), Arc::new(InMemoryProxyLoader::new())),
        CacheBackend::File => {
            let file = JsonFileCache::open(config.service_proxies_dir.join(PROXY_CACHE_FILE))?;
            (
                ProxyDefinitionCache::new(Arc::new(file)),
                Arc::new(FileProxyLoader::new(generator.clone())),
            )
        }
    };
    ServiceProxyFactory::new(cache, generator, loader).register_as_default(&registry)?;

    for (name, factory) in &config.lazy_services {
        registry.set_proxy_service(name, factory.as_deref());
    }

    let events = Arc::new(EventManager::new());
    let recorder = CallGraphRecorder::new();
    if config.logged_service_manager {
        let bus: Arc<dyn EventBus> = events.clone();
        instrument(&registry, bus);
        recorder.attach(events.as_ref());
    }

    info!(
        registry = %registry.registrar(),
        logged = config.logged_service_manager,
        lazy_services = config.lazy_services.len(),
        cache = ?config.service_proxies_cache,
        "locator bootstrapped"
    );

    Ok(Locator {
        registry,
        events,
        recorder,
        config,
    })
}
