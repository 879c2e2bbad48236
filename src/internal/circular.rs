//! Circular construction detection.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{DiError, DiResult};
use crate::trace::RegistrarId;

// Canonical names currently being constructed on this thread, per registry
thread_local! {
    static IN_FLIGHT: RefCell<Vec<(RegistrarId, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a canonical name as under construction until dropped.
pub(crate) struct InFlightGuard {
    depth: usize,
}

impl InFlightGuard {
    /// Fails with the full chain if `canonical` is already being built by
    /// `registrar` further up this thread's stack.
    pub(crate) fn enter(registrar: RegistrarId, canonical: &str) -> DiResult<Self> {
        IN_FLIGHT.with(|tls| {
            let mut stack = tls.borrow_mut();

            if let Some(start) = stack
                .iter()
                .position(|(id, name)| *id == registrar && name == canonical)
            {
                let mut path: Vec<String> = stack[start..]
                    .iter()
                    .filter(|(id, _)| *id == registrar)
                    .map(|(_, name)| name.clone())
                    .collect();
                path.push(canonical.to_string());
                return Err(DiError::CircularDependency(path));
            }

            stack.push((registrar, canonical.to_string()));
            Ok(Self { depth: stack.len() })
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        IN_FLIGHT.with(|tls| tls.borrow_mut().truncate(self.depth - 1));
    }
}

/// Runs a construction step for `canonical` with cycle detection, turning a
/// panicking factory into [`DiError::ServiceNotCreated`].
pub(crate) fn with_circular_catch<T, F>(
    registrar: RegistrarId,
    canonical: &str,
    requested: &str,
    f: F,
) -> DiResult<T>
where
    F: FnOnce() -> DiResult<T>,
{
    let _guard = InFlightGuard::enter(registrar, canonical)?;

    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "factory panicked".to_string());
            Err(DiError::not_created(requested, message))
        }
    }
}
