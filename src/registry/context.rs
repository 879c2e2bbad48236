//! Resolver context handed to factories.

use std::any::Any;
use std::sync::Arc;

use crate::error::DiResult;
use crate::instance::Instance;
use crate::name::ServiceName;

use super::ServiceRegistry;

/// Context passed to factory functions for resolving dependencies.
///
/// Lookups made through the context go through the full registry `get`, so
/// they are intercepted, recorded and attributed to the service being built.
///
/// # Examples
///
/// ```
/// use lazy_locator::{Instance, ServiceRegistry};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let registry = ServiceRegistry::new();
/// registry.set_service("database", Instance::object(Database { url: "postgres://localhost".into() })).unwrap();
/// registry.set_factory("users", |ctx| {
///     Ok(Instance::object(UserService { db: ctx.get_as::<Database>("database")? }))
/// }).unwrap();
///
/// let users = registry.get_as::<UserService>("users").unwrap();
/// assert_eq!(users.db.url, "postgres://localhost");
/// ```
pub struct ResolverContext<'a> {
    registry: &'a ServiceRegistry,
    name: &'a ServiceName,
}

impl<'a> ResolverContext<'a> {
    pub(crate) fn new(registry: &'a ServiceRegistry, name: &'a ServiceName) -> Self {
        Self { registry, name }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        self.registry
    }

    /// Name of the service being constructed.
    pub fn service_name(&self) -> &ServiceName {
        self.name
    }

    pub fn get(&self, name: impl Into<ServiceName>) -> DiResult<Instance> {
        self.registry.get(name)
    }

    pub fn get_as<T: Any + Send + Sync>(&self, name: impl Into<ServiceName>) -> DiResult<Arc<T>> {
        self.registry.get_as(name)
    }

    pub fn get_shared<T: ?Sized + Send + Sync + 'static>(&self, name: impl Into<ServiceName>) -> DiResult<Arc<T>> {
        self.registry.get_shared(name)
    }

    pub fn create(&self, name: impl Into<ServiceName>) -> DiResult<Instance> {
        self.registry.create(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.registry.has(name)
    }
}
