//! Lazy stand-in objects.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

use super::generator::ProxyDefinition;
use super::loader::ProxyLoader;
use super::shape::{ClassShape, MethodShape};
use super::target::ProxyTarget;
use crate::catalog::TypeCatalog;
use crate::error::{DiError, DiResult};

/// What a proxy was doing when it had to initialize.
pub struct LazyInit<'a> {
    pub proxy: &'a ServiceProxy,
    pub method: &'a str,
    pub args: &'a [Value],
}

/// Produces the wrapped instance on first use.
pub type ProxyInitializer = Arc<dyn Fn(&LazyInit<'_>) -> DiResult<Arc<dyn ProxyTarget>> + Send + Sync>;

struct ProxyState {
    initializer: Option<ProxyInitializer>,
    initialized: bool,
    wrapped: Option<Arc<dyn ProxyTarget>>,
    // set on clones of an uninitialized proxy: the initializer's result is
    // shared with the original, so the clone takes a private copy
    copy_on_init: bool,
}

/// A stand-in that forwards to a wrapped service, building it on first use.
///
/// Every forwarded method, property access, clone of an initialized proxy
/// and snapshot goes through initialization first. The initializer runs at
/// most once per proxy; a failed initializer is kept and retried on the
/// next access.
///
/// Cloning an initialized proxy deep-copies the wrapped instance. Cloning an
/// uninitialized proxy yields another lazy proxy that will copy whatever the
/// shared initializer produces.
pub struct ServiceProxy {
    definition: Arc<ProxyDefinition>,
    state: Mutex<ProxyState>,
    init_lock: ReentrantMutex<()>,
}

impl ServiceProxy {
    /// A proxy that defers to `initializer` on first access.
    pub fn lazy(definition: Arc<ProxyDefinition>, initializer: ProxyInitializer) -> Self {
        Self::with_state(
            definition,
            ProxyState {
                initializer: Some(initializer),
                initialized: false,
                wrapped: None,
                copy_on_init: false,
            },
        )
    }

    /// A proxy already forwarding to `wrapped`.
    pub fn initialized(definition: Arc<ProxyDefinition>, wrapped: Arc<dyn ProxyTarget>) -> Self {
        Self::with_state(
            definition,
            ProxyState {
                initializer: None,
                initialized: true,
                wrapped: Some(wrapped),
                copy_on_init: false,
            },
        )
    }

    fn with_state(definition: Arc<ProxyDefinition>, state: ProxyState) -> Self {
        Self {
            definition,
            state: Mutex::new(state),
            init_lock: ReentrantMutex::new(()),
        }
    }

    pub fn definition(&self) -> &Arc<ProxyDefinition> {
        &self.definition
    }

    pub fn proxy_type(&self) -> &str {
        &self.definition.proxy_type
    }

    pub fn original_type(&self) -> &str {
        &self.definition.original_type
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn has_initializer(&self) -> bool {
        self.state.lock().initializer.is_some()
    }

    /// The wrapped instance if initialization already happened.
    pub fn wrapped_if_initialized(&self) -> Option<Arc<dyn ProxyTarget>> {
        self.state.lock().wrapped.clone()
    }

    fn ready(&self) -> Option<Arc<dyn ProxyTarget>> {
        let state = self.state.lock();
        match (&state.initializer, &state.wrapped) {
            (None, Some(wrapped)) => Some(wrapped.clone()),
            _ => None,
        }
    }

    fn initialize(&self, method: &str, args: &[Value]) -> DiResult<Arc<dyn ProxyTarget>> {
        if let Some(wrapped) = self.ready() {
            return Ok(wrapped);
        }

        let _init = self.init_lock.lock();
        let initializer = {
            let mut state = self.state.lock();
            match state.initializer.take() {
                Some(initializer) => initializer,
                None => {
                    return match &state.wrapped {
                        Some(wrapped) => Ok(wrapped.clone()),
                        // the initializer is running further up this thread
                        None => Err(DiError::CircularDependency(vec![self.proxy_type().to_string()])),
                    }
                }
            }
        };

        let context = LazyInit {
            proxy: self,
            method,
            args,
        };
        match initializer(&context) {
            Ok(target) => {
                let mut state = self.state.lock();
                let target = if state.copy_on_init {
                    target.clone_target()
                } else {
                    target
                };
                state.initialized = true;
                state.wrapped = Some(target.clone());
                Ok(target)
            }
            Err(e) => {
                self.state.lock().initializer = Some(initializer);
                Err(e)
            }
        }
    }

    /// Initializes the proxy (if needed) and returns the wrapped instance.
    pub fn target(&self) -> DiResult<Arc<dyn ProxyTarget>> {
        self.initialize("target", &[])
    }

    /// Runs `f` against the wrapped instance downcast to `T`.
    pub fn with_target<T: ProxyTarget, R>(&self, f: impl FnOnce(&T) -> R) -> DiResult<R> {
        let target = self.target()?;
        target
            .as_any()
            .downcast_ref::<T>()
            .map(f)
            .ok_or_else(|| DiError::TypeMismatch(self.original_type().to_string()))
    }

    /// Forwards a method call. Omitted trailing arguments are filled from
    /// declared defaults.
    pub fn call(&self, method: &str, args: Vec<Value>) -> DiResult<Value> {
        let forwarded = self
            .definition
            .method(method)
            .ok_or_else(|| DiError::UnknownMember {
                type_name: self.original_type().to_string(),
                member: method.to_string(),
            })?;

        if args.len() > forwarded.params.len() {
            return Err(DiError::invocation(
                method,
                format!(
                    "takes at most {} argument(s), {} given",
                    forwarded.params.len(),
                    args.len()
                ),
            ));
        }
        if args.len() < forwarded.required_arity() {
            return Err(DiError::invocation(
                method,
                format!(
                    "takes at least {} argument(s), {} given",
                    forwarded.required_arity(),
                    args.len()
                ),
            ));
        }

        let mut args = args;
        for param in &forwarded.params[args.len()..] {
            args.push(param.default.clone().unwrap_or(Value::Null));
        }

        let target = self.initialize(method, &args)?;
        target.invoke(method, &args)
    }

    pub fn get_property(&self, name: &str) -> DiResult<Option<Value>> {
        let target = self.initialize("get_property", &[Value::from(name)])?;
        target.get_property(name)
    }

    pub fn set_property(&self, name: &str, value: Value) -> DiResult<()> {
        let target = self.initialize("set_property", &[Value::from(name), value.clone()])?;
        target.set_property(name, value)
    }

    pub fn has_property(&self, name: &str) -> DiResult<bool> {
        let target = self.initialize("has_property", &[Value::from(name)])?;
        target.has_property(name)
    }

    /// Initializes, then captures the flag and the wrapped state. Nothing
    /// else about the proxy is carried over.
    pub fn snapshot(&self) -> DiResult<ProxySnapshot> {
        let target = self.initialize("snapshot", &[])?;
        Ok(ProxySnapshot {
            proxy_type: self.proxy_type().to_string(),
            initialized: self.is_initialized(),
            wrapped: target.serialize_state(),
        })
    }
}

impl Clone for ServiceProxy {
    fn clone(&self) -> Self {
        // an initializer running on another thread has taken the initializer
        // but not stored the wrapped instance yet
        let _init = self.init_lock.lock();
        let state = self.state.lock();
        let cloned = match (&state.initializer, &state.wrapped) {
            (None, Some(wrapped)) => ProxyState {
                initializer: None,
                initialized: state.initialized,
                wrapped: Some(wrapped.clone_target()),
                copy_on_init: false,
            },
            (initializer, _) => ProxyState {
                initializer: initializer.clone(),
                initialized: false,
                wrapped: None,
                copy_on_init: true,
            },
        };
        Self::with_state(self.definition.clone(), cloned)
    }
}

impl fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("proxy_type", &self.definition.proxy_type)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Serialize for ServiceProxy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot()
            .map_err(<S::Error as serde::ser::Error>::custom)?
            .serialize(serializer)
    }
}

impl ProxyTarget for ServiceProxy {
    fn shape(&self) -> ClassShape {
        self.definition
            .methods
            .iter()
            .fold(ClassShape::class(self.original_type()), |shape, m| {
                let mut method = MethodShape::public(m.name.clone());
                method.params = m.params.clone();
                method.returns_reference = m.returns_reference;
                shape.method(method)
            })
    }

    fn invoke(&self, method: &str, args: &[Value]) -> DiResult<Value> {
        self.call(method, args.to_vec())
    }

    fn get_property(&self, name: &str) -> DiResult<Option<Value>> {
        ServiceProxy::get_property(self, name)
    }

    fn set_property(&self, name: &str, value: Value) -> DiResult<()> {
        ServiceProxy::set_property(self, name, value)
    }

    fn has_property(&self, name: &str) -> DiResult<bool> {
        ServiceProxy::has_property(self, name)
    }

    fn serialize_state(&self) -> Value {
        let state = self
            .snapshot()
            .and_then(|s| serde_json::to_value(s).map_err(|e| DiError::invocation("snapshot", e.to_string())));
        match state {
            Ok(state) => state,
            Err(e) => {
                warn!(proxy = %self.proxy_type(), error = %e, "proxy state could not be captured");
                Value::Null
            }
        }
    }
}

/// Serialized form of a [`ServiceProxy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxySnapshot {
    pub proxy_type: String,
    pub initialized: bool,
    pub wrapped: Value,
}

impl ProxySnapshot {
    /// Rebuilds a proxy around a fresh copy of the serialized state. The
    /// result has no initializer and shares nothing with the proxy the
    /// snapshot was taken from.
    ///
    /// The restored proxy reports itself uninitialized whatever the
    /// snapshot's flag says; only the wrapped state carries over, and calls
    /// forward to it directly.
    pub fn restore(&self, catalog: &TypeCatalog, loader: &dyn ProxyLoader) -> DiResult<ServiceProxy> {
        let definition = loader
            .find(&self.proxy_type)
            .ok_or_else(|| DiError::TypeResolution {
                type_name: self.proxy_type.clone(),
                reason: "proxy type is not loaded".to_string(),
            })?;
        let wrapped = catalog.restore(&definition.original_type, &self.wrapped)?;

        Ok(ServiceProxy::with_state(
            definition,
            ProxyState {
                initializer: None,
                initialized: false,
                wrapped: Some(wrapped),
                copy_on_init: false,
            },
        ))
    }
}
