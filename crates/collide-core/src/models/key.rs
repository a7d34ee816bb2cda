//! Record and field addressing

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one shared record in the surrounding application's store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Logical table or collection name (e.g. `products`)
    pub table: String,
    /// Record identifier within the table
    pub record_id: String,
}

impl RecordKey {
    /// Create a record key from its parts.
    #[must_use]
    pub fn new(table: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            record_id: record_id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.record_id)
    }
}

/// Addresses a single field of one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldKey {
    /// Record the field belongs to
    pub record: RecordKey,
    /// Field name within the record
    pub field: String,
}

impl FieldKey {
    /// Create a field key from its parts.
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        record_id: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            record: RecordKey::new(table, record_id),
            field: field.into(),
        }
    }

    /// Table name of the addressed record.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.record.table
    }

    /// Identifier of the addressed record.
    #[must_use]
    pub fn record_id(&self) -> &str {
        &self.record.record_id
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.record, self.field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        let key = FieldKey::new("products", "42", "price");
        assert_eq!(key.record.to_string(), "products/42");
        assert_eq!(key.to_string(), "products/42.price");
    }

    #[test]
    fn test_equal_keys_hash_equal() {
        let a = FieldKey::new("products", "42", "price");
        let b = FieldKey::new("products", "42", "price");
        assert_eq!(a, b);
    }
}
