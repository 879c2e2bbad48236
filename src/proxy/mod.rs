//! Lazy service proxies.
//!
//! A proxied service name resolves to a [`ServiceProxy`] instead of the real
//! service. The proxy forwards through a [`ProxyDefinition`] generated from
//! the service's [`ClassShape`] and only builds the real service when it is
//! first used.
//!
//! - [`ProxyTarget`]: the introspection and dispatch seam a service implements
//!   to be proxyable
//! - [`ProxyGenerator`] / [`ProxyLoader`]: derive definitions and make them
//!   findable by proxy type name
//! - [`ProxyDefinitionCache`]: requested name to proxy type, over an
//!   [`ExternalCache`]
//! - [`ServiceProxyFactory`]: the abstract factory the registry routes
//!   proxied names through

mod cache;
mod factory;
mod generator;
mod loader;
mod service_proxy;
mod shape;
mod target;

pub use cache::{ExternalCache, JsonFileCache, MemoryCache, ProxyDefinitionCache};
pub use factory::ServiceProxyFactory;
pub use generator::{
    ForwardedMethod, ProxyDefinition, ProxyGenerator, DEFAULT_PROXY_NAMESPACE, PROXY_MARKER, RESERVED_MEMBERS,
    SERIALIZED_FIELDS,
};
pub use loader::{FileProxyLoader, InMemoryProxyLoader, ProxyLoader};
pub use service_proxy::{LazyInit, ProxyInitializer, ProxySnapshot, ServiceProxy};
pub use shape::{ClassShape, MethodShape, ParamShape, TypeKind, Visibility};
pub use target::{CloneTarget, ProxyTarget};
