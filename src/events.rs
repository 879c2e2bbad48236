//! Service events and the in-process event bus.
//!
//! [`instrument`] connects a registry to an [`EventBus`]: every successful
//! `get` and `create` triggers a [`ServiceEvent`] carrying the returned
//! instance and the resolution context at that moment. Listeners such as the
//! [`CallGraphRecorder`](crate::CallGraphRecorder) or [`TracingListener`]
//! subscribe without the registry knowing about them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::instance::Instance;
use crate::interceptor::{InterceptedCall, InterceptorHooks};
use crate::name::{canonicalize, ServiceName};
use crate::registry::{RegistrarRef, ServiceRegistry};
use crate::trace::{self, CallArg, CallFrame};

/// Triggered after a registry `get` returns.
pub const EVENT_GET: &str = "locator.get";
/// Triggered after a registry `create` returns.
pub const EVENT_CREATE: &str = "locator.create";

/// One successful `get` or `create`.
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    name: &'static str,
    registrar: RegistrarRef,
    instance: Instance,
    requested_name: String,
    canonical_name: String,
    trace: Vec<CallFrame>,
}

impl ServiceEvent {
    /// Builds an event, capturing the current resolution context as its trace.
    pub fn new(name: &'static str, registrar: RegistrarRef, instance: Instance, service: &ServiceName) -> Self {
        Self {
            name,
            registrar,
            instance,
            requested_name: service.requested().to_string(),
            canonical_name: service.canonical().to_string(),
            trace: trace::capture(),
        }
    }

    /// Replaces the captured trace.
    pub fn with_trace(mut self, trace: Vec<CallFrame>) -> Self {
        self.trace = trace;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn registrar(&self) -> &RegistrarRef {
        &self.registrar
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn requested_name(&self) -> &str {
        &self.requested_name
    }

    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    pub fn trace(&self) -> &[CallFrame] {
        &self.trace
    }
}

/// Event handler callback.
pub type EventHandler = Arc<dyn Fn(&ServiceEvent) + Send + Sync>;

/// Handle returned by [`EventBus::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Routes service events to handlers by event name.
pub trait EventBus: Send + Sync {
    fn attach(&self, event: &str, handler: EventHandler) -> HandlerId;

    /// Returns whether the handler was attached to this bus.
    fn detach(&self, handler: HandlerId) -> bool;

    fn trigger(&self, event: &ServiceEvent);
}

/// A group of handlers attached and detached together.
pub trait ListenerAggregate {
    fn attach(&self, bus: &dyn EventBus);

    fn detach(&self, bus: &dyn EventBus);
}

struct Registered {
    id: HandlerId,
    event: String,
    handler: EventHandler,
}

/// In-process [`EventBus`]. Handlers run synchronously, in attach order.
#[derive(Default)]
pub struct EventManager {
    next_id: AtomicU64,
    handlers: RwLock<Vec<Registered>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().iter().filter(|h| h.event == event).count()
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

impl EventBus for EventManager {
    fn attach(&self, event: &str, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push(Registered {
            id,
            event: event.to_string(),
            handler,
        });
        id
    }

    fn detach(&self, handler: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|h| h.id != handler);
        handlers.len() != before
    }

    fn trigger(&self, event: &ServiceEvent) {
        // Handlers may resolve services (and trigger again), so don't hold the lock
        let matching: Vec<EventHandler> = self
            .handlers
            .read()
            .iter()
            .filter(|h| h.event == event.name())
            .map(|h| h.handler.clone())
            .collect();
        for handler in matching {
            handler(event);
        }
    }
}

/// Makes `registry` trigger a [`ServiceEvent`] on `bus` after every
/// successful `get` and `create`, including nested calls made by factories.
///
/// Nested registries are logged too: the hooks spread to the registry's
/// peers, to peers added later, and to any registry it returns as a
/// service, unless those already have hooks of their own.
pub fn instrument(registry: &ServiceRegistry, bus: Arc<dyn EventBus>) {
    let hooks = InterceptorHooks::for_methods(&["get", "create"], move |call: &InterceptedCall<'_, ServiceRegistry>| {
        let Some(instance) = call.return_value.downcast_ref::<Instance>() else {
            return;
        };
        let registry = call.target;
        if let Some(child) = instance.downcast::<ServiceRegistry>() {
            registry.share_interceptors(&child);
        }
        let name = match call.args.first() {
            Some(CallArg::Pair(canonical, requested)) => ServiceName::pair(canonical.as_str(), requested.as_str()),
            // a get through an alias reports the name it landed on
            Some(CallArg::Name(requested)) if call.method == "get" => {
                let canonical = canonicalize(requested);
                let resolved = registry.resolve_alias(&canonical).unwrap_or(canonical);
                ServiceName::pair(resolved, requested.as_str())
            }
            Some(CallArg::Name(requested)) => ServiceName::new(requested.as_str()),
            _ => return,
        };
        let event = if call.method == "create" { EVENT_CREATE } else { EVENT_GET };
        bus.trigger(&ServiceEvent::new(
            event,
            registry.registrar().clone(),
            instance.clone(),
            &name,
        ));
    });
    debug!(registry = %registry.registrar(), "instrumenting registry");
    registry.intercept_with(Arc::new(hooks));
    for peer in registry.peers() {
        registry.share_interceptors(&peer);
    }
}

/// Logs every service event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingListener {
    handlers: Mutex<Vec<HandlerId>>,
}

impl TracingListener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ListenerAggregate for TracingListener {
    fn attach(&self, bus: &dyn EventBus) {
        let handler: EventHandler = Arc::new(|event: &ServiceEvent| {
            tracing::info!(
                event = event.name(),
                registry = %event.registrar(),
                service = event.requested_name(),
                canonical = event.canonical_name(),
                instance = %event.instance().id(),
                depth = event.trace().len(),
                "service resolved"
            );
        });
        let mut handlers = self.handlers.lock();
        handlers.push(bus.attach(EVENT_GET, handler.clone()));
        handlers.push(bus.attach(EVENT_CREATE, handler));
    }

    fn detach(&self, bus: &dyn EventBus) {
        self.handlers.lock().retain(|id| !bus.detach(*id));
    }
}
