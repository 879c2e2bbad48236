//! Public shape of a proxiable type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of type a shape describes. Only classes can be proxied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Class,
    Interface,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

/// A declared parameter, optionally with a default filled in when callers
/// omit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamShape {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamShape {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }
}

/// Signature of one method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodShape {
    pub name: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_constructor: bool,
    #[serde(default)]
    pub returns_reference: bool,
    #[serde(default)]
    pub params: Vec<ParamShape>,
}

impl MethodShape {
    /// A public instance method with no parameters.
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            is_final: false,
            is_static: false,
            is_constructor: false,
            returns_reference: false,
            params: Vec::new(),
        }
    }

    pub fn constructor(name: impl Into<String>) -> Self {
        Self {
            is_constructor: true,
            ..Self::public(name)
        }
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn final_(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn by_reference(mut self) -> Self {
        self.returns_reference = true;
        self
    }

    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamShape::required(name));
        self
    }

    pub fn param_with_default(mut self, name: impl Into<String>, default: Value) -> Self {
        self.params.push(ParamShape::optional(name, default));
        self
    }
}

/// Methods and declared fields of a type, as seen by the proxy generator.
///
/// ```
/// use lazy_locator::proxy::{ClassShape, MethodShape};
///
/// let shape = ClassShape::class("Mailer")
///     .method(MethodShape::public("send").param("to"))
///     .field("transport");
/// assert_eq!(shape.methods.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassShape {
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub methods: Vec<MethodShape>,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl ClassShape {
    pub fn class(name: impl Into<String>) -> Self {
        Self::of_kind(name, TypeKind::Class)
    }

    pub fn of_kind(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn method(mut self, method: MethodShape) -> Self {
        self.methods.push(method);
        self
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }
}
