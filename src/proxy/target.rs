//! The introspection seam proxied services implement.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;

use super::shape::ClassShape;
use crate::error::{DiError, DiResult};

/// Deep copy and downcasting, provided for every `Clone` target.
pub trait CloneTarget {
    /// Copies the object and everything it owns.
    fn clone_target(&self) -> Arc<dyn ProxyTarget>;

    fn as_any(&self) -> &dyn Any;
}

impl<T: ProxyTarget + Clone> CloneTarget for T {
    fn clone_target(&self) -> Arc<dyn ProxyTarget> {
        Arc::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A service that can sit behind a [`ServiceProxy`](super::ServiceProxy).
///
/// Methods are dispatched by name with JSON arguments, which is what lets a
/// single proxy type forward to any target. Implementations use interior
/// mutability for state changed through `invoke` or `set_property`.
///
/// ```
/// use lazy_locator::proxy::{ClassShape, MethodShape, ProxyTarget};
/// use lazy_locator::{DiError, DiResult};
/// use serde_json::{json, Value};
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Counter(AtomicI64);
///
/// impl Clone for Counter {
///     fn clone(&self) -> Self {
///         Counter(AtomicI64::new(self.0.load(Ordering::SeqCst)))
///     }
/// }
///
/// impl ProxyTarget for Counter {
///     fn shape(&self) -> ClassShape {
///         ClassShape::class("Counter").method(MethodShape::public("bump"))
///     }
///
///     fn invoke(&self, method: &str, _args: &[Value]) -> DiResult<Value> {
///         match method {
///             "bump" => Ok(json!(self.0.fetch_add(1, Ordering::SeqCst) + 1)),
///             other => Err(DiError::UnknownMember {
///                 type_name: "Counter".into(),
///                 member: other.into(),
///             }),
///         }
///     }
/// }
///
/// let counter = Counter::default();
/// assert_eq!(counter.invoke("bump", &[]).unwrap(), json!(1));
/// ```
pub trait ProxyTarget: CloneTarget + Send + Sync + 'static {
    fn shape(&self) -> ClassShape;

    fn invoke(&self, method: &str, args: &[Value]) -> DiResult<Value>;

    /// Reads an undeclared (dynamic) property.
    fn get_property(&self, name: &str) -> DiResult<Option<Value>> {
        let _ = name;
        Ok(None)
    }

    fn set_property(&self, name: &str, value: Value) -> DiResult<()> {
        let _ = value;
        Err(DiError::UnknownMember {
            type_name: self.shape().name,
            member: name.to_string(),
        })
    }

    /// Whether a property is set to a non-null value.
    fn has_property(&self, name: &str) -> DiResult<bool> {
        Ok(matches!(self.get_property(name)?, Some(v) if !v.is_null()))
    }

    /// State carried into a [`ProxySnapshot`](super::ProxySnapshot).
    fn serialize_state(&self) -> Value {
        Value::Null
    }
}
