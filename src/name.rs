//! Service name canonicalization.
//!
//! Consumers ask for services with free-form names (`Mailer\Transport`,
//! `mailer-transport`, `mailer_transport`). Every map lookup inside the
//! locator goes through [`canonicalize`], so all of those spellings address
//! the same binding.

use std::fmt;

use serde::{Deserialize, Serialize};

const STRIPPED: [char; 5] = ['-', '_', ' ', '\\', '/'];

/// Maps a requested service name to its canonical lookup key.
///
/// Removes `-`, `_`, space, `\` and `/`, then lower-cases the rest. Total and
/// idempotent.
///
/// ```
/// use lazy_locator::canonicalize;
///
/// assert_eq!(canonicalize("Foo_Bar"), "foobar");
/// assert_eq!(canonicalize("foo/bar"), canonicalize("foo bar"));
/// assert_eq!(canonicalize("App\\Mailer-Transport"), "appmailertransport");
/// ```
pub fn canonicalize(name: &str) -> String {
    name.chars()
        .filter(|c| !STRIPPED.contains(c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// A service name as requested together with its canonical form.
///
/// Usually built from a plain string, in which case the canonical form is
/// derived. The explicit pair form carries a canonical name computed
/// upstream (the registry uses it when a proxy factory hands a name back to
/// [`ServiceRegistry::create_real`](crate::ServiceRegistry::create_real)).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceName {
    canonical: String,
    requested: String,
}

impl ServiceName {
    /// Builds a name from what the consumer typed.
    pub fn new(requested: impl Into<String>) -> Self {
        let requested = requested.into();
        Self {
            canonical: canonicalize(&requested),
            requested,
        }
    }

    /// Builds a name from an already-known `(canonical, requested)` pair.
    pub fn pair(canonical: impl Into<String>, requested: impl Into<String>) -> Self {
        Self {
            canonical: canonical.into(),
            requested: requested.into(),
        }
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn requested(&self) -> &str {
        &self.requested
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.requested)
    }
}

impl From<&str> for ServiceName {
    fn from(requested: &str) -> Self {
        ServiceName::new(requested)
    }
}

impl From<String> for ServiceName {
    fn from(requested: String) -> Self {
        ServiceName::new(requested)
    }
}

impl From<&String> for ServiceName {
    fn from(requested: &String) -> Self {
        ServiceName::new(requested.as_str())
    }
}

impl From<&ServiceName> for ServiceName {
    fn from(name: &ServiceName) -> Self {
        name.clone()
    }
}

impl<C: Into<String>, R: Into<String>> From<(C, R)> for ServiceName {
    fn from((canonical, requested): (C, R)) -> Self {
        ServiceName::pair(canonical, requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_separators_and_case() {
        for name in ["foo_bar", "foobar", "foo-bar", "foo/bar", "foo bar", "FOO\\Bar"] {
            assert_eq!(canonicalize(name), "foobar", "{name}");
        }
    }

    #[test]
    fn empty_and_separator_only_names() {
        assert_eq!(canonicalize(""), "");
        assert_eq!(canonicalize("-_ \\/"), "");
    }

    #[test]
    fn pair_keeps_upstream_canonical() {
        let name: ServiceName = ("already-canonical", "Requested\\Name").into();
        assert_eq!(name.canonical(), "already-canonical");
        assert_eq!(name.requested(), "Requested\\Name");
        assert_eq!(name.to_string(), "Requested\\Name");
    }

    #[test]
    fn plain_name_derives_canonical() {
        let name = ServiceName::new("App\\Mailer");
        assert_eq!(name.canonical(), "appmailer");
        assert_eq!(name.requested(), "App\\Mailer");
    }
}
