//! Making generated proxy definitions findable by name.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::generator::{ProxyDefinition, ProxyGenerator};
use crate::error::{DiError, DiResult};

/// Loads generated proxy definitions and finds them again by proxy type name.
///
/// `find` returning `None` means the type does not exist (any more); callers
/// treat that as a reason to regenerate.
pub trait ProxyLoader: Send + Sync {
    fn load(&self, definition: &ProxyDefinition) -> DiResult<Arc<ProxyDefinition>>;

    fn find(&self, proxy_type: &str) -> Option<Arc<ProxyDefinition>>;
}

/// Keeps definitions for the lifetime of the process.
#[derive(Default)]
pub struct InMemoryProxyLoader {
    loaded: RwLock<HashMap<String, Arc<ProxyDefinition>>>,
}

impl InMemoryProxyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.loaded.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.read().is_empty()
    }
}

impl ProxyLoader for InMemoryProxyLoader {
    fn load(&self, definition: &ProxyDefinition) -> DiResult<Arc<ProxyDefinition>> {
        let definition = Arc::new(definition.clone());
        self.loaded
            .write()
            .insert(definition.proxy_type.clone(), definition.clone());
        Ok(definition)
    }

    fn find(&self, proxy_type: &str) -> Option<Arc<ProxyDefinition>> {
        self.loaded.read().get(proxy_type).cloned()
    }
}

/// Writes definitions to the generator's source location so they survive
/// process restarts, keeping an in-memory copy of everything seen.
pub struct FileProxyLoader {
    generator: ProxyGenerator,
    memory: InMemoryProxyLoader,
}

impl FileProxyLoader {
    pub fn new(generator: ProxyGenerator) -> Self {
        Self {
            generator,
            memory: InMemoryProxyLoader::new(),
        }
    }

    pub fn generator(&self) -> &ProxyGenerator {
        &self.generator
    }

    fn read_from_disk(&self, proxy_type: &str) -> Option<ProxyDefinition> {
        let original = self.generator.original_type_name(proxy_type)?;
        let path = self.generator.proxy_source_location(original);
        let source = fs::read_to_string(&path).ok()?;
        let definition: ProxyDefinition = serde_json::from_str(&source).ok()?;
        (definition.proxy_type == proxy_type).then_some(definition)
    }
}

impl ProxyLoader for FileProxyLoader {
    fn load(&self, definition: &ProxyDefinition) -> DiResult<Arc<ProxyDefinition>> {
        let path = self.generator.proxy_source_location(&definition.original_type);
        let source = self.generator.render_source(definition)?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| DiError::TypeResolution {
                type_name: definition.original_type.clone(),
                reason: format!("cannot create {}: {}", dir.display(), e),
            })?;
        }
        fs::write(&path, source).map_err(|e| DiError::TypeResolution {
            type_name: definition.original_type.clone(),
            reason: format!("cannot write {}: {}", path.display(), e),
        })?;
        debug!(path = %path.display(), "wrote proxy definition");

        self.memory.load(definition)
    }

    fn find(&self, proxy_type: &str) -> Option<Arc<ProxyDefinition>> {
        if let Some(found) = self.memory.find(proxy_type) {
            return Some(found);
        }
        let definition = self.read_from_disk(proxy_type)?;
        self.memory.load(&definition).ok()
    }
}
