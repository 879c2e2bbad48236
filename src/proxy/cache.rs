//! Proxy definition cache: requested service name to proxy type name.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{DiError, DiResult};

/// Opaque key/value store backing the proxy definition cache.
pub trait ExternalCache: Send + Sync {
    fn get_item(&self, key: &str) -> DiResult<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> DiResult<()>;
}

/// Process-local cache.
#[derive(Default)]
pub struct MemoryCache {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExternalCache for MemoryCache {
    fn get_item(&self, key: &str) -> DiResult<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> DiResult<()> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A JSON object on disk, rewritten on every `set_item`.
pub struct JsonFileCache {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl JsonFileCache {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> DiResult<Self> {
        let path = path.into();
        let items = match fs::read_to_string(&path) {
            Ok(source) => serde_json::from_str(&source)
                .map_err(|e| DiError::Cache(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(DiError::Cache(format!("{}: {}", path.display(), e))),
        };
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> DiResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| DiError::Cache(format!("{}: {}", dir.display(), e)))?;
        }
        let source = serde_json::to_string_pretty(items).map_err(|e| DiError::Cache(e.to_string()))?;
        fs::write(&self.path, source).map_err(|e| DiError::Cache(format!("{}: {}", self.path.display(), e)))
    }
}

impl ExternalCache for JsonFileCache {
    fn get_item(&self, key: &str) -> DiResult<Option<String>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> DiResult<()> {
        let mut items = self.items.lock();
        items.insert(key.to_string(), value.to_string());
        self.persist(&items)
    }
}

/// Maps the exact requested name of a proxied service to the proxy type
/// generated for it.
///
/// Entries are never invalidated here. A caller that finds an entry whose
/// proxy type no longer loads treats it as a miss and overwrites it.
#[derive(Clone)]
pub struct ProxyDefinitionCache {
    backend: Arc<dyn ExternalCache>,
}

impl ProxyDefinitionCache {
    pub fn new(backend: Arc<dyn ExternalCache>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    pub fn get(&self, requested_name: &str) -> DiResult<Option<String>> {
        self.backend.get_item(requested_name)
    }

    pub fn set(&self, requested_name: &str, proxy_type: &str) -> DiResult<()> {
        self.backend.set_item(requested_name, proxy_type)
    }
}

impl Default for ProxyDefinitionCache {
    fn default() -> Self {
        Self::in_memory()
    }
}
