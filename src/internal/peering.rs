//! Peer lookup loop detection.

use std::cell::RefCell;

use crate::trace::RegistrarId;

// Registries currently consulting their peers for a canonical name on this thread
thread_local! {
    static WALKING: RefCell<Vec<(RegistrarId, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks `registrar` as asking its peers for `canonical` until dropped.
pub(crate) struct PeerWalk {
    depth: usize,
}

impl PeerWalk {
    /// Returns `None` when `registrar` is already asking its peers for
    /// `canonical` further up this thread's stack, which happens when
    /// registries peer each other.
    pub(crate) fn enter(registrar: RegistrarId, canonical: &str) -> Option<Self> {
        WALKING.with(|tls| {
            let mut stack = tls.borrow_mut();
            if stack.iter().any(|(id, name)| *id == registrar && name == canonical) {
                return None;
            }
            stack.push((registrar, canonical.to_string()));
            Some(Self { depth: stack.len() })
        })
    }
}

impl Drop for PeerWalk {
    fn drop(&mut self) {
        WALKING.with(|tls| tls.borrow_mut().truncate(self.depth - 1));
    }
}
