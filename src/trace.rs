//! Resolution context: the explicit call stack the recorder walks.
//!
//! Every registry `get`, `create` and `create_real` pushes a [`CallFrame`]
//! for its duration, and consumers that pull dependencies lazily can push a
//! frame of their own with [`enter`]. A captured trace is a copy of the
//! current thread's stack, innermost frame first.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::instance::ObjectId;
use crate::name::{canonicalize, ServiceName};

thread_local! {
    static FRAMES: RefCell<Vec<CallFrame>> = const { RefCell::new(Vec::new()) };
}

static NEXT_REGISTRAR: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct RegistrarId(u64);

impl RegistrarId {
    pub(crate) fn next() -> Self {
        RegistrarId(NEXT_REGISTRAR.fetch_add(1, Ordering::Relaxed))
    }

    /// Builds an id from a raw value; hand-built traces in tests use this.
    pub const fn from_raw(raw: u64) -> Self {
        RegistrarId(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registrar#{}", self.0)
    }
}

/// The object a frame was executing on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameObject {
    /// A service registry.
    Registrar(RegistrarId),
    /// A service pulling dependencies on its own behalf. `locator_aware`
    /// marks consumers that were handed a registry and may defer lookups.
    Consumer { id: ObjectId, locator_aware: bool },
}

/// One argument of a traced call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    Name(String),
    /// `(canonical, requested)`
    Pair(String, String),
    Other,
}

impl CallArg {
    /// The requested name carried by this argument.
    pub fn requested(&self) -> Option<&str> {
        match self {
            CallArg::Name(name) => Some(name),
            CallArg::Pair(_, requested) => Some(requested),
            CallArg::Other => None,
        }
    }

    /// The canonical name carried by this argument, derived for plain names.
    pub fn canonical(&self) -> Option<String> {
        match self {
            CallArg::Name(name) => Some(canonicalize(name)),
            CallArg::Pair(canonical, _) => Some(canonical.clone()),
            CallArg::Other => None,
        }
    }
}

impl From<&ServiceName> for CallArg {
    fn from(name: &ServiceName) -> Self {
        if canonicalize(name.requested()) == name.canonical() {
            CallArg::Name(name.requested().to_string())
        } else {
            CallArg::Pair(name.canonical().to_string(), name.requested().to_string())
        }
    }
}

impl From<&str> for CallArg {
    fn from(name: &str) -> Self {
        CallArg::Name(name.to_string())
    }
}

/// One entry of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub object: Option<FrameObject>,
    pub function: String,
    pub args: Vec<CallArg>,
}

impl CallFrame {
    /// A frame executed by a registry.
    pub fn registrar(id: RegistrarId, function: &str, arg: impl Into<CallArg>) -> Self {
        Self {
            object: Some(FrameObject::Registrar(id)),
            function: function.to_string(),
            args: vec![arg.into()],
        }
    }

    /// A frame executed by a consumer object.
    pub fn consumer(id: ObjectId, locator_aware: bool, function: &str) -> Self {
        Self {
            object: Some(FrameObject::Consumer { id, locator_aware }),
            function: function.to_string(),
            args: Vec::new(),
        }
    }

    /// A frame with no invoking object (a free function).
    pub fn free(function: &str) -> Self {
        Self {
            object: None,
            function: function.to_string(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<CallArg>) -> Self {
        self.args = args;
        self
    }
}

/// Keeps a frame on the current thread's stack until dropped.
#[must_use = "the frame is popped when the guard is dropped"]
pub struct FrameGuard {
    depth: usize,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            frames.borrow_mut().truncate(self.depth - 1);
        });
    }
}

/// Pushes `frame` onto the current thread's resolution context.
pub fn enter(frame: CallFrame) -> FrameGuard {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        frames.push(frame);
        FrameGuard {
            depth: frames.len(),
        }
    })
}

/// Copies the current thread's stack, innermost frame first.
pub fn capture() -> Vec<CallFrame> {
    FRAMES.with(|frames| frames.borrow().iter().rev().cloned().collect())
}

/// Number of frames currently on this thread's stack.
pub fn depth() -> usize {
    FRAMES.with(|frames| frames.borrow().len())
}
