//! Error types for the service locator.

use thiserror::Error;

/// Boxed error carried as the cause of a failed construction.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Service locator errors
///
/// Every registry operation propagates these to its immediate caller. The
/// call-graph recorder never raises them; recording is fail-soft.
///
/// # Examples
///
/// ```rust
/// use lazy_locator::{DiError, ServiceRegistry};
///
/// let registry = ServiceRegistry::new();
/// match registry.get("mailer") {
///     Err(DiError::ServiceNotFound(name)) => assert_eq!(name, "mailer"),
///     _ => unreachable!(),
/// }
/// ```
///
/// ```rust
/// use lazy_locator::DiError;
///
/// let circular = DiError::CircularDependency(vec!["a".into(), "b".into(), "a".into()]);
/// assert_eq!(circular.to_string(), "Circular dependency: a -> b -> a");
/// ```
#[derive(Debug, Error)]
pub enum DiError {
    /// A name is already bound and overriding is disabled
    #[error("Naming conflict: a service named \"{0}\" is already registered")]
    NamingConflict(String),
    /// Unbound name, unresolved alias chain or unreachable peer
    #[error("Service not found: {0}")]
    ServiceNotFound(String),
    /// The underlying construction failed; the cause is preserved
    #[error("Service not created: {name}: {source}")]
    ServiceNotCreated {
        name: String,
        #[source]
        source: BoxError,
    },
    /// A resolution chain revisited a canonical name already in progress
    #[error("Circular dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),
    /// A type could not be introspected for proxy generation
    #[error("Type resolution failed for {type_name}: {reason}")]
    TypeResolution { type_name: String, reason: String },
    /// Malformed factory, invokable or alias registration
    #[error("Invalid binding for \"{name}\": {reason}")]
    InvalidBinding { name: String, reason: String },
    /// A resolved instance was not of the requested type
    #[error("Type mismatch for: {0}")]
    TypeMismatch(String),
    /// A proxy was asked for a method or property its type does not forward
    #[error("Unknown member {member} on {type_name}")]
    UnknownMember { type_name: String, member: String },
    /// A forwarded call failed inside the wrapped instance
    #[error("Invocation of {member} failed: {reason}")]
    Invocation { member: String, reason: String },
    /// The proxy-definition cache backend failed
    #[error("Cache error: {0}")]
    Cache(String),
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DiError {
    /// Wraps an arbitrary construction failure for the service `name`.
    pub fn not_created(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        DiError::ServiceNotCreated {
            name: name.into(),
            source: source.into(),
        }
    }

    pub(crate) fn invalid_binding(name: impl Into<String>, reason: impl Into<String>) -> Self {
        DiError::InvalidBinding {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invocation(member: impl Into<String>, reason: impl Into<String>) -> Self {
        DiError::Invocation {
            member: member.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error reports a missing service (as opposed to a broken one).
    pub fn is_not_found(&self) -> bool {
        matches!(self, DiError::ServiceNotFound(_))
    }
}

/// Result type for locator operations
pub type DiResult<T> = Result<T, DiError>;
