//! # lazy-locator
//!
//! A name-based service locator that defers expensive construction behind
//! lazy proxies and records, at runtime, which services were built or fetched
//! on behalf of which others.
//!
//! ## Features
//!
//! - **Canonical names**: `Mailer\Transport`, `mailer-transport` and
//!   `MAILER_TRANSPORT` address the same service
//! - **Bindings**: instances, factories, factory services, invokable types
//!   and aliases, with override protection and alias cycle detection
//! - **Lazy proxies**: names marked as proxied resolve to a [`ServiceProxy`]
//!   that builds the real service on first use
//! - **Call-graph recording**: every `get`/`create` is logged with its
//!   resolution context so dependencies can be reconstructed afterwards
//! - **Diagram export**: dependency graphs as yUML class diagrams
//!
//! ## Quick Start
//!
//! ```rust
//! use lazy_locator::config::{bootstrap, LocatorConfig};
//! use lazy_locator::Instance;
//!
//! struct Database;
//! struct UserService;
//!
//! let locator = bootstrap(LocatorConfig::default()).unwrap();
//! let registry = locator.registry();
//!
//! registry.set_factory("database", |_| Ok(Instance::object(Database))).unwrap();
//! registry.set_factory("users", |ctx| {
//!     ctx.get("database")?;
//!     Ok(Instance::object(UserService))
//! }).unwrap();
//!
//! registry.get("users").unwrap();
//!
//! let recorder = locator.recorder();
//! assert!(recorder.dependencies_of("users").contains("database"));
//! assert_eq!(
//!     lazy_locator::diagram::edges(&recorder.summary()),
//!     "[users]->[database]"
//! );
//! ```
//!
//! ## Lazy Services
//!
//! ```rust
//! use lazy_locator::config::{bootstrap, LocatorConfig};
//! use lazy_locator::proxy::{ClassShape, MethodShape, ProxyTarget, ServiceProxy};
//! use lazy_locator::{DiResult, Instance};
//! use serde_json::Value;
//!
//! #[derive(Clone)]
//! struct Thumbnailer;
//!
//! impl ProxyTarget for Thumbnailer {
//!     fn shape(&self) -> ClassShape {
//!         ClassShape::class("Thumbnailer").method(MethodShape::public("resize").param("width"))
//!     }
//!     fn invoke(&self, _method: &str, args: &[Value]) -> DiResult<Value> {
//!         Ok(args[0].clone())
//!     }
//! }
//!
//! let config = LocatorConfig::default().lazy_service("thumbnailer", None);
//! let locator = bootstrap(config).unwrap();
//! let registry = locator.registry();
//! registry.set_factory("thumbnailer", |_| Ok(Instance::target(Thumbnailer))).unwrap();
//! registry.set_shared("thumbnailer", false).unwrap();
//!
//! // the first proxy primes the definition cache
//! registry.get("thumbnailer").unwrap();
//!
//! let proxy = registry.get_as::<ServiceProxy>("thumbnailer").unwrap();
//! assert!(!proxy.is_initialized());
//! assert_eq!(proxy.call("resize", vec![Value::from(64)]).unwrap(), Value::from(64));
//! assert!(proxy.is_initialized());
//! ```

pub mod catalog;
pub mod config;
pub mod diagram;
pub mod error;
pub mod events;
pub mod instance;
pub mod interceptor;
pub mod name;
pub mod proxy;
pub mod recorder;
pub mod registration;
pub mod registry;
pub mod trace;

#[cfg(feature = "graph-export")]
pub mod collector;

#[cfg(feature = "web")]
pub mod web;

// Internal modules
mod internal;

pub use catalog::TypeCatalog;
pub use config::{bootstrap, LocatorConfig, Locator};
pub use error::{BoxError, DiError, DiResult};
pub use events::{instrument, EventBus, EventManager, ListenerAggregate, ServiceEvent, TracingListener, EVENT_CREATE, EVENT_GET};
pub use instance::{Instance, ObjectId};
pub use interceptor::{AccessInterceptor, InterceptorHooks};
pub use name::{canonicalize, ServiceName};
pub use proxy::{ProxyTarget, ServiceProxy, ServiceProxyFactory};
pub use recorder::{CallGraphRecorder, InstantiationEvent, LoggedService, ServiceSummary, Verb};
pub use registration::{AbstractFactory, Binding, ServiceFactory};
pub use registry::{RegistrarRef, RegistryOptions, ResolverContext, ServiceRegistry, WeakRegistry};

#[cfg(feature = "graph-export")]
pub use collector::{GraphCollector, GraphSnapshot};
