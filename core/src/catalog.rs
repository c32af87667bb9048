//! Operation Catalog - Known Instrumented Operations
//!
//! The catalog is the static table of remote operations known at binding time.
//! It is built once from contract metadata and never mutated afterwards, so it
//! is shared behind an `Arc` and read without synchronization. A call whose
//! action is absent from the catalog is proxied uninstrumented - deliberately,
//! not as an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata for one remote operation, keyed by its outgoing call identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDescriptor {
    /// The outgoing message's action identifier.
    pub call_id: String,
    /// Human-readable operation name used as the span name.
    pub display_name: String,
    /// One-way operations never expect a reply.
    pub is_one_way: bool,
}

impl OperationDescriptor {
    pub fn new(call_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            display_name: display_name.into(),
            is_one_way: false,
        }
    }

    pub fn one_way(mut self) -> Self {
        self.is_one_way = true;
        self
    }
}

/// Read-only lookup from call identifier to operation metadata.
#[derive(Debug, Default)]
pub struct OperationCatalog {
    operations: HashMap<String, OperationDescriptor>,
}

impl OperationCatalog {
    /// Build the catalog from contract metadata records.
    ///
    /// Later records with a duplicate `call_id` replace earlier ones.
    pub fn from_contract(records: impl IntoIterator<Item = OperationDescriptor>) -> Self {
        let operations = records
            .into_iter()
            .map(|op| (op.call_id.clone(), op))
            .collect();
        Self { operations }
    }

    pub fn lookup(&self, call_id: &str) -> Option<&OperationDescriptor> {
        self.operations.get(call_id)
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.operations.contains_key(call_id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_and_unknown() {
        let catalog = OperationCatalog::from_contract(vec![
            OperationDescriptor::new("urn:quotes/Get", "GetQuote"),
            OperationDescriptor::new("urn:quotes/Publish", "PublishQuote").one_way(),
        ]);

        let get = catalog.lookup("urn:quotes/Get").expect("cataloged");
        assert_eq!(get.display_name, "GetQuote");
        assert!(!get.is_one_way);

        let publish = catalog.lookup("urn:quotes/Publish").expect("cataloged");
        assert!(publish.is_one_way);

        assert!(catalog.lookup("urn:quotes/Unknown").is_none());
        assert!(catalog.contains("urn:quotes/Get"));
        assert!(!catalog.contains("urn:quotes/Unknown"));
        assert_eq!(catalog.len(), 2);
    }
}
