//! Binding kinds and factory seams.

use std::fmt;
use std::sync::Arc;

use crate::error::DiResult;
use crate::instance::Instance;
use crate::registry::{ResolverContext, ServiceRegistry};

/// Factory closure stored by [`Binding::Factory`].
pub type FactoryFn = Arc<dyn for<'a> Fn(&ResolverContext<'a>) -> DiResult<Instance> + Send + Sync>;

/// Callback run on every freshly constructed instance.
pub type InstanceInitializer = Arc<dyn Fn(&Instance, &ServiceRegistry) -> DiResult<()> + Send + Sync>;

/// A factory registered as a service of its own and referenced by name from
/// [`Binding::FactoryService`]. Store it with
/// `Instance::shared(Arc::new(factory) as Arc<dyn ServiceFactory>)`.
pub trait ServiceFactory: Send + Sync {
    fn create_service(&self, ctx: &ResolverContext<'_>) -> DiResult<Instance>;
}

/// A fallback factory consulted for names without a binding, and the shape
/// proxy factories take.
pub trait AbstractFactory: Send + Sync {
    fn can_create(&self, registry: &ServiceRegistry, canonical: &str, requested: &str) -> bool;

    fn create_with_name(&self, registry: &ServiceRegistry, canonical: &str, requested: &str) -> DiResult<Instance>;
}

/// What a canonical name is bound to. One kind per name at a time.
#[derive(Clone)]
pub enum Binding {
    /// A ready-made instance, always shared.
    Instance(Instance),
    Factory(FactoryFn),
    /// Name of a service implementing [`ServiceFactory`].
    FactoryService(String),
    /// Type name registered in the [`TypeCatalog`](crate::TypeCatalog).
    Invokable(String),
    /// Another service name.
    Alias(String),
}

impl Binding {
    pub fn factory<F>(f: F) -> Self
    where
        F: for<'a> Fn(&ResolverContext<'a>) -> DiResult<Instance> + Send + Sync + 'static,
    {
        Binding::Factory(Arc::new(f))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Binding::Instance(_) => "instance",
            Binding::Factory(_) => "factory",
            Binding::FactoryService(_) => "factory service",
            Binding::Invokable(_) => "invokable",
            Binding::Alias(_) => "alias",
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Instance(instance) => f.debug_tuple("Instance").field(instance).finish(),
            Binding::Factory(_) => f.write_str("Factory(..)"),
            Binding::FactoryService(name) => f.debug_tuple("FactoryService").field(name).finish(),
            Binding::Invokable(type_name) => f.debug_tuple("Invokable").field(type_name).finish(),
            Binding::Alias(target) => f.debug_tuple("Alias").field(target).finish(),
        }
    }
}
