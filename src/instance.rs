//! Type-erased service instances.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::proxy::ProxyTarget;

/// Type-erased Arc for storage
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Identity of an object instance: the address of its shared allocation.
///
/// Two handles to the same service instance compare equal; a deep copy gets
/// a new id. Ids are only meaningful while the instance is alive, which the
/// call-graph recorder guarantees by holding on to every instance it logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(usize);

impl ObjectId {
    /// Identity of whatever `arc` points at.
    pub fn of<T: ?Sized>(arc: &Arc<T>) -> Self {
        ObjectId(Arc::as_ptr(arc) as *const () as usize)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Object,
    Value,
}

/// A resolved service.
///
/// Objects carry identity and are the only instances the recorder logs.
/// Values (configuration maps, strings, numbers) resolve like any other
/// service but are never attributed in the dependency graph.
///
/// ```
/// use lazy_locator::Instance;
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync { fn hello(&self) -> String; }
/// struct English;
/// impl Greeter for English { fn hello(&self) -> String { "hello".into() } }
///
/// let greeter: Arc<dyn Greeter> = Arc::new(English);
/// let instance = Instance::shared(greeter);
/// assert_eq!(instance.downcast_shared::<dyn Greeter>().unwrap().hello(), "hello");
///
/// let setting = Instance::value(42u32);
/// assert!(!setting.is_object());
/// ```
#[derive(Clone)]
pub struct Instance {
    value: AnyArc,
    id: ObjectId,
    kind: Kind,
    type_name: &'static str,
    target: Option<Arc<dyn ProxyTarget>>,
}

impl Instance {
    /// Wraps a fresh object.
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an existing shared object, keeping its identity.
    pub fn from_arc<T: Any + Send + Sync>(arc: Arc<T>) -> Self {
        Self {
            id: ObjectId::of(&arc),
            value: arc,
            kind: Kind::Object,
            type_name: type_name::<T>(),
            target: None,
        }
    }

    /// Wraps a trait object. Stored as `Arc<Arc<dyn Trait>>` so it can be
    /// downcast again with [`downcast_shared`](Self::downcast_shared).
    pub fn shared<T: ?Sized + Send + Sync + 'static>(arc: Arc<T>) -> Self {
        Self {
            id: ObjectId::of(&arc),
            value: Arc::new(arc),
            kind: Kind::Object,
            type_name: type_name::<T>(),
            target: None,
        }
    }

    /// Wraps an object that can be introspected and proxied.
    pub fn target<T: ProxyTarget>(value: T) -> Self {
        Self::target_arc(Arc::new(value))
    }

    /// Shared form of [`target`](Self::target).
    pub fn target_arc<T: ProxyTarget>(arc: Arc<T>) -> Self {
        let view: Arc<dyn ProxyTarget> = arc.clone();
        Self {
            id: ObjectId::of(&arc),
            value: arc,
            kind: Kind::Object,
            type_name: type_name::<T>(),
            target: Some(view),
        }
    }

    /// Wraps a value without identity.
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        let value = Arc::new(value);
        Self {
            id: ObjectId::of(&value),
            value,
            kind: Kind::Value,
            type_name: type_name::<T>(),
            target: None,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn is_object(&self) -> bool {
        self.kind == Kind::Object
    }

    /// Rust type name of the wrapped value, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    /// Recovers a trait object stored with [`shared`](Self::shared).
    pub fn downcast_shared<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value
            .clone()
            .downcast::<Arc<T>>()
            .ok()
            .map(|outer| Arc::clone(&*outer))
    }

    /// The introspection view, present for instances built with
    /// [`target`](Self::target) (including service proxies).
    pub fn as_target(&self) -> Option<Arc<dyn ProxyTarget>> {
        self.target.clone()
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        self.id == other.id
    }

    pub fn into_any(self) -> AnyArc {
        self.value
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_name)
            .field("id", &self.id)
            .field("object", &self.is_object())
            .finish()
    }
}
