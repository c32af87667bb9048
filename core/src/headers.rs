//! Header Bags and Correlation Header Names
//!
//! Two header surfaces travel with every envelope: a transport-level bag and a
//! payload-level bag whose entries are qualified by a namespace. The decorators
//! only ever write two correlation identifiers (root id, parent id) into them;
//! the names of those headers are configurable strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A read/write string header surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderBag(BTreeMap<String, String>);

impl HeaderBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Insert a payload-level named header qualified as `namespace/name`.
    pub fn insert_qualified(
        &mut self,
        namespace: &str,
        name: &str,
        value: impl Into<String>,
    ) {
        self.0.insert(format!("{namespace}/{name}"), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn get_qualified(&self, namespace: &str, name: &str) -> Option<&str> {
        self.0.get(&format!("{namespace}/{name}")).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Names of the two correlation headers and the payload-level namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationHeaders {
    /// Transport/payload header carrying the operation root id.
    pub root_header: String,
    /// Transport/payload header carrying the immediate parent id.
    pub parent_header: String,
    /// Namespace qualifying the payload-level copies.
    pub namespace: String,
}

impl Default for CorrelationHeaders {
    fn default() -> Self {
        Self {
            root_header: "x-dependency-root-id".to_string(),
            parent_header: "x-dependency-parent-id".to_string(),
            namespace: "wiretap".to_string(),
        }
    }
}

impl CorrelationHeaders {
    /// Write the two correlation ids into both of an envelope's header bags.
    pub fn inject(&self, root_id: &str, parent_id: &str, envelope: &mut crate::envelope::Envelope) {
        envelope.transport_headers.insert(&self.root_header, root_id);
        envelope.transport_headers.insert(&self.parent_header, parent_id);
        envelope
            .named_headers
            .insert_qualified(&self.namespace, &self.root_header, root_id);
        envelope
            .named_headers
            .insert_qualified(&self.namespace, &self.parent_header, parent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_headers() {
        let mut bag = HeaderBag::new();
        bag.insert("x-plain", "1");
        bag.insert_qualified("wiretap", "x-dependency-root-id", "root-1");

        assert_eq!(bag.get("x-plain"), Some("1"));
        assert_eq!(bag.get_qualified("wiretap", "x-dependency-root-id"), Some("root-1"));
        assert_eq!(bag.get("x-dependency-root-id"), None);
    }

    #[test]
    fn test_inject_writes_both_bags() {
        use crate::envelope::Envelope;

        let headers = CorrelationHeaders::default();
        let mut envelope = Envelope::request("urn:quotes/Get");
        headers.inject("root-1", "parent-1", &mut envelope);

        assert_eq!(envelope.transport_headers.get("x-dependency-root-id"), Some("root-1"));
        assert_eq!(envelope.transport_headers.get("x-dependency-parent-id"), Some("parent-1"));
        assert_eq!(
            envelope.named_headers.get_qualified("wiretap", "x-dependency-root-id"),
            Some("root-1")
        );
        assert_eq!(
            envelope.named_headers.get_qualified("wiretap", "x-dependency-parent-id"),
            Some("parent-1")
        );
    }

    #[test]
    fn test_default_header_names() {
        let headers = CorrelationHeaders::default();
        assert_eq!(headers.root_header, "x-dependency-root-id");
        assert_eq!(headers.parent_header, "x-dependency-parent-id");
        assert_eq!(headers.namespace, "wiretap");
    }
}
