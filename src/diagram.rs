//! yUML class-diagram export of a recorded dependency graph.

use std::collections::BTreeMap;

use crate::recorder::ServiceSummary;

/// Diagram service the edge list is appended to.
pub const YUML_BASE_URL: &str = "http://yuml.me/diagram/plain/class/";

/// Prefix of the rendered diagram location returned by the diagram service.
pub const YUML_REDIRECT_BASE: &str = "http://yuml.me/";

/// `[service]->[dependency]` for every dependency in `summary`, comma
/// separated, in service then dependency order.
///
/// ```
/// use lazy_locator::diagram::edges;
/// use lazy_locator::ServiceSummary;
/// use std::collections::BTreeMap;
///
/// let mut summary = BTreeMap::new();
/// let mut x = ServiceSummary::default();
/// x.dependencies.insert("y".to_string());
/// summary.insert("x".to_string(), x);
/// summary.insert("y".to_string(), ServiceSummary::default());
///
/// assert_eq!(edges(&summary), "[x]->[y]");
/// ```
pub fn edges(summary: &BTreeMap<String, ServiceSummary>) -> String {
    summary
        .iter()
        .flat_map(|(service, entry)| {
            entry
                .dependencies
                .iter()
                .map(move |dependency| format!("[{}]->[{}]", service, dependency))
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Diagram URL for `summary`: [`YUML_BASE_URL`] followed by the
/// percent-encoded [`edges`]. An empty summary yields the base URL alone.
pub fn export(summary: &BTreeMap<String, ServiceSummary>) -> String {
    format!("{}{}", YUML_BASE_URL, urlencoding::encode(&edges(summary)))
}
