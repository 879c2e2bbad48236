//! Named constructors for invokable services and proxy targets.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DiError, DiResult};
use crate::instance::Instance;
use crate::proxy::{ClassShape, ProxyTarget};

type Construct = Arc<dyn Fn() -> DiResult<Instance> + Send + Sync>;
type Restore = Arc<dyn Fn(&Value) -> DiResult<Arc<dyn ProxyTarget>> + Send + Sync>;

#[derive(Clone)]
struct CatalogEntry {
    construct: Construct,
    restore: Option<Restore>,
}

/// Type names the registry can instantiate without a factory.
///
/// Invokable bindings name an entry here. Entries registered with
/// [`register_target`](Self::register_target) can also be introspected for
/// proxy generation and rebuilt from a proxy snapshot.
///
/// ```
/// use lazy_locator::TypeCatalog;
///
/// struct Clock;
///
/// let catalog = TypeCatalog::new();
/// catalog.register("Clock", || Clock);
/// assert!(catalog.contains("Clock"));
/// assert!(catalog.instantiate("Clock").unwrap().is::<Clock>());
/// ```
#[derive(Default)]
pub struct TypeCatalog {
    entries: RwLock<HashMap<String, CatalogEntry>>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plain object type.
    pub fn register<T, F>(&self, type_name: impl Into<String>, ctor: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.entries.write().insert(
            type_name.into(),
            CatalogEntry {
                construct: Arc::new(move || Ok(Instance::object(ctor()))),
                restore: None,
            },
        );
    }

    /// Registers a proxiable type whose snapshots deserialize back into `T`.
    pub fn register_target<T, F>(&self, type_name: impl Into<String>, ctor: F)
    where
        T: ProxyTarget + DeserializeOwned,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        let restore_name = type_name.clone();
        self.entries.write().insert(
            type_name,
            CatalogEntry {
                construct: Arc::new(move || Ok(Instance::target(ctor()))),
                restore: Some(Arc::new(move |state: &Value| {
                    let target: T = serde_json::from_value(state.clone()).map_err(|e| DiError::TypeResolution {
                        type_name: restore_name.clone(),
                        reason: e.to_string(),
                    })?;
                    Ok(Arc::new(target) as Arc<dyn ProxyTarget>)
                })),
            },
        );
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.read().contains_key(type_name)
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn entry(&self, type_name: &str) -> Option<CatalogEntry> {
        self.entries.read().get(type_name).cloned()
    }

    /// Builds a new instance of `type_name`.
    pub fn instantiate(&self, type_name: &str) -> DiResult<Instance> {
        let entry = self
            .entry(type_name)
            .ok_or_else(|| DiError::not_created(type_name, format!("unknown type {}", type_name)))?;
        (entry.construct)()
    }

    /// Public shape of `type_name`, taken from a sample instance.
    pub fn shape_of(&self, type_name: &str) -> DiResult<ClassShape> {
        let unresolved = |reason: &str| DiError::TypeResolution {
            type_name: type_name.to_string(),
            reason: reason.to_string(),
        };
        let entry = self.entry(type_name).ok_or_else(|| unresolved("type does not exist"))?;
        let sample = (entry.construct)()?;
        sample
            .as_target()
            .map(|target| target.shape())
            .ok_or_else(|| unresolved("type cannot be introspected"))
    }

    /// Rebuilds a proxy target of `type_name` from serialized state.
    pub fn restore(&self, type_name: &str, state: &Value) -> DiResult<Arc<dyn ProxyTarget>> {
        let restore = self
            .entry(type_name)
            .and_then(|entry| entry.restore)
            .ok_or_else(|| DiError::TypeResolution {
                type_name: type_name.to_string(),
                reason: "type cannot be restored from a snapshot".to_string(),
            })?;
        restore(state)
    }
}
