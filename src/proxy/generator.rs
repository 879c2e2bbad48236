//! Proxy definition generation.
//!
//! A [`ProxyDefinition`] is the dispatch table a [`ServiceProxy`](super::ServiceProxy)
//! forwards through: which methods exist on the original type, their
//! parameters and defaults, and which fields survive serialization. The
//! generator derives it from a [`ClassShape`]; loaders make it findable by
//! proxy type name later on.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::shape::{ClassShape, MethodShape, ParamShape, TypeKind, Visibility};
use crate::catalog::TypeCatalog;
use crate::error::{DiError, DiResult};

/// Namespace generated proxy type names live under unless configured.
pub const DEFAULT_PROXY_NAMESPACE: &str = "lazy_locator::proxies";

/// Marker segment between namespace and original type name.
pub const PROXY_MARKER: &str = "__CG__";

/// Members every proxy handles itself; a target method with one of these
/// names is never forwarded.
pub const RESERVED_MEMBERS: [&str; 8] = [
    "get_property",
    "set_property",
    "has_property",
    "clone_target",
    "serialize_state",
    "shape",
    "invoke",
    "as_any",
];

/// The only state a serialized proxy carries.
pub const SERIALIZED_FIELDS: [&str; 2] = ["initialized", "wrapped"];

/// A method the proxy forwards to its wrapped instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardedMethod {
    pub name: String,
    pub params: Vec<ParamShape>,
    #[serde(default)]
    pub returns_reference: bool,
}

impl ForwardedMethod {
    /// Minimum number of arguments a caller must pass.
    pub fn required_arity(&self) -> usize {
        self.params
            .iter()
            .rposition(|p| p.default.is_none())
            .map_or(0, |i| i + 1)
    }
}

/// Generated proxy type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyDefinition {
    pub proxy_type: String,
    pub original_type: String,
    pub methods: Vec<ForwardedMethod>,
    /// Fields declared by the original type. None of them is serialized;
    /// a restored proxy gets them from a fresh copy of the wrapped state.
    pub excluded_fields: Vec<String>,
    pub serialized_fields: Vec<String>,
}

impl ProxyDefinition {
    pub fn method(&self, name: &str) -> Option<&ForwardedMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Derives proxy type names, source locations and definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyGenerator {
    namespace: String,
    directory: PathBuf,
}

impl Default for ProxyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_PROXY_NAMESPACE, std::env::temp_dir())
    }
}

impl ProxyGenerator {
    pub fn new(namespace: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            namespace: namespace.into(),
            directory: directory.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `{namespace}::__CG__::{original}`
    pub fn proxy_type_name(&self, original: &str) -> String {
        format!("{}::{}::{}", self.namespace, PROXY_MARKER, original)
    }

    /// Recovers the original type name from a generated proxy type name.
    pub fn original_type_name<'a>(&self, proxy_type: &'a str) -> Option<&'a str> {
        proxy_type
            .strip_prefix(self.namespace.as_str())?
            .strip_prefix("::")?
            .strip_prefix(PROXY_MARKER)?
            .strip_prefix("::")
    }

    /// `{directory}/__CG__{original with :: as .}.json`
    ///
    /// Path segments never contain `.`, so distinct type names get distinct
    /// files.
    pub fn proxy_source_location(&self, original: &str) -> PathBuf {
        self.directory
            .join(format!("{}{}.json", PROXY_MARKER, original.replace("::", ".")))
    }

    /// Builds the definition for `shape`.
    ///
    /// Constructors, static, final and non-public methods are not forwarded,
    /// nor are methods clashing with [`RESERVED_MEMBERS`]. Duplicate method
    /// names keep their first declaration.
    pub fn generate(&self, shape: &ClassShape) -> DiResult<ProxyDefinition> {
        if shape.kind != TypeKind::Class {
            return Err(DiError::TypeResolution {
                type_name: shape.name.clone(),
                reason: format!("{:?} shapes cannot be proxied", shape.kind).to_lowercase(),
            });
        }
        if shape.name.is_empty() {
            return Err(DiError::TypeResolution {
                type_name: shape.name.clone(),
                reason: "type has no name".to_string(),
            });
        }

        let mut seen = HashSet::new();
        let methods = shape
            .methods
            .iter()
            .filter(|m| is_forwardable(m))
            .filter(|m| seen.insert(m.name.to_lowercase()))
            .map(|m| ForwardedMethod {
                name: m.name.clone(),
                params: m.params.clone(),
                returns_reference: m.returns_reference,
            })
            .collect::<Vec<_>>();

        let proxy_type = self.proxy_type_name(&shape.name);
        debug!(proxy_type = %proxy_type, methods = methods.len(), "generated proxy definition");

        Ok(ProxyDefinition {
            proxy_type,
            original_type: shape.name.clone(),
            methods,
            excluded_fields: shape.fields.clone(),
            serialized_fields: SERIALIZED_FIELDS.iter().map(|f| f.to_string()).collect(),
        })
    }

    /// Introspects `type_name` through the catalog and generates its proxy.
    pub fn generate_for(&self, type_name: &str, catalog: &TypeCatalog) -> DiResult<ProxyDefinition> {
        let shape = catalog.shape_of(type_name)?;
        self.generate(&shape)
    }

    /// The persisted form of a definition.
    pub fn render_source(&self, definition: &ProxyDefinition) -> DiResult<String> {
        serde_json::to_string_pretty(definition).map_err(|e| DiError::TypeResolution {
            type_name: definition.original_type.clone(),
            reason: e.to_string(),
        })
    }
}

fn is_forwardable(method: &MethodShape) -> bool {
    method.visibility == Visibility::Public
        && !method.is_constructor
        && !method.is_static
        && !method.is_final
        && !RESERVED_MEMBERS.contains(&method.name.as_str())
}
