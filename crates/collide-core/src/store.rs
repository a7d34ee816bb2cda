//! Persistence boundary.
//!
//! The engine never owns the record store; it reads field values to capture
//! edit baselines and writes resolved values back through this trait. The
//! host application supplies the real implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::Result;
use crate::models::FieldKey;

/// External record store the engine commits resolved values to.
#[async_trait]
pub trait FieldStore: Send + Sync {
    /// Current committed value of a field, `None` if the field is unset.
    async fn read_field(&self, key: &FieldKey) -> Result<Option<Value>>;

    /// Commit a resolved value.
    async fn write_field(&self, key: &FieldKey, value: &Value) -> Result<()>;
}

/// In-memory field store for tests and the CLI scenario runner.
#[derive(Debug, Default)]
pub struct MemoryFieldStore {
    fields: DashMap<FieldKey, Value>,
}

impl MemoryFieldStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a committed field value, bypassing the engine.
    pub fn seed(&self, key: FieldKey, value: Value) {
        self.fields.insert(key, value);
    }

    /// Read a committed value synchronously (test helper).
    #[must_use]
    pub fn get(&self, key: &FieldKey) -> Option<Value> {
        self.fields.get(key).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl FieldStore for MemoryFieldStore {
    async fn read_field(&self, key: &FieldKey) -> Result<Option<Value>> {
        Ok(self.get(key))
    }

    async fn write_field(&self, key: &FieldKey, value: &Value) -> Result<()> {
        self.fields.insert(key.clone(), value.clone());
        Ok(())
    }
}
