//! Post-call interception of named methods.
//!
//! [`InterceptorHooks`] holds hooks keyed by method name. An
//! [`AccessInterceptor`] wraps a target so calls routed through it fire the
//! hooks after the real method returns successfully; the target never knows.
//! The registry accepts the same hooks directly so that nested `get`/`create`
//! calls made from inside factories are intercepted as well.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::DiResult;
use crate::trace::CallArg;

/// What a hook sees after an intercepted call.
pub struct InterceptedCall<'a, T: ?Sized> {
    pub target: &'a T,
    pub method: &'a str,
    pub args: &'a [CallArg],
    pub return_value: &'a dyn Any,
}

/// Hook invoked after a successful intercepted call.
pub type PostCallHook<T> = Arc<dyn for<'a> Fn(&InterceptedCall<'a, T>) + Send + Sync>;

/// Hooks keyed by method name.
pub struct InterceptorHooks<T: ?Sized> {
    hooks: HashMap<String, Vec<PostCallHook<T>>>,
}

impl<T: ?Sized> Default for InterceptorHooks<T> {
    fn default() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }
}

impl<T: ?Sized> InterceptorHooks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `hook` for `method`.
    pub fn on<F>(mut self, method: &str, hook: F) -> Self
    where
        F: for<'a> Fn(&InterceptedCall<'a, T>) + Send + Sync + 'static,
    {
        self.hooks
            .entry(method.to_string())
            .or_default()
            .push(Arc::new(hook));
        self
    }

    /// One hook shared by several methods.
    pub fn for_methods<F>(methods: &[&str], hook: F) -> Self
    where
        F: for<'a> Fn(&InterceptedCall<'a, T>) + Send + Sync + 'static,
    {
        let hook: PostCallHook<T> = Arc::new(hook);
        let mut hooks = Self::new();
        for method in methods {
            hooks
                .hooks
                .entry(method.to_string())
                .or_default()
                .push(hook.clone());
        }
        hooks
    }

    pub fn is_intercepted(&self, method: &str) -> bool {
        self.hooks.contains_key(method)
    }

    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<_> = self.hooks.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    /// Runs every hook registered for `method`, in registration order.
    pub fn fire(&self, target: &T, method: &str, args: &[CallArg], return_value: &dyn Any) {
        let Some(hooks) = self.hooks.get(method) else {
            return;
        };
        let call = InterceptedCall {
            target,
            method,
            args,
            return_value,
        };
        for hook in hooks {
            hook(&call);
        }
    }
}

impl<T: ?Sized> fmt::Debug for InterceptorHooks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorHooks")
            .field("methods", &self.methods())
            .finish()
    }
}

/// Wraps a target so calls made through [`call`](Self::call) fire hooks.
///
/// ```
/// use lazy_locator::interceptor::{AccessInterceptor, InterceptorHooks};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// struct Calculator;
/// impl Calculator {
///     fn double(&self, x: i32) -> i32 { x * 2 }
/// }
///
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = seen.clone();
/// let hooks = InterceptorHooks::<Calculator>::new().on("double", move |call| {
///     if let Some(v) = call.return_value.downcast_ref::<i32>() {
///         counter.store(*v as usize, Ordering::SeqCst);
///     }
/// });
///
/// let calc = AccessInterceptor::wrap(Arc::new(Calculator), hooks);
/// let result = calc.call("double", &[], |c| Ok(c.double(21))).unwrap();
/// assert_eq!(result, 42);
/// assert_eq!(seen.load(Ordering::SeqCst), 42);
/// ```
pub struct AccessInterceptor<T: ?Sized> {
    target: Arc<T>,
    hooks: Arc<InterceptorHooks<T>>,
}

impl<T: ?Sized> Clone for AccessInterceptor<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<T: ?Sized> AccessInterceptor<T> {
    pub fn wrap(target: Arc<T>, hooks: InterceptorHooks<T>) -> Self {
        Self {
            target,
            hooks: Arc::new(hooks),
        }
    }

    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    pub fn hooks(&self) -> &Arc<InterceptorHooks<T>> {
        &self.hooks
    }

    /// Calls `f` on the target, then fires the hooks for `method` with its
    /// return value. Errors propagate without firing anything.
    pub fn call<R: Any>(&self, method: &str, args: &[CallArg], f: impl FnOnce(&T) -> DiResult<R>) -> DiResult<R> {
        let value = f(&self.target)?;
        self.hooks.fire(&self.target, method, args, &value);
        Ok(value)
    }
}
