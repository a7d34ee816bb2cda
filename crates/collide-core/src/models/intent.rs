//! Edit intent model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::key::FieldKey;
use super::session::{SessionId, UserRef};

/// A unique identifier for an edit intent, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(Uuid);

impl IntentId {
    /// Create a new unique intent ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for IntentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IntentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A single proposed field write from one session.
///
/// Immutable once created; a later intent from the same session on the same
/// field supersedes it in the open-intents index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditIntent {
    /// Unique intent identifier
    pub id: IntentId,
    /// Field the write targets
    pub key: FieldKey,
    /// Session the intent originates from
    pub session_id: SessionId,
    /// User behind the session
    pub user: UserRef,
    /// Value the editor started from (the session's view of the prior value)
    pub original_value: Value,
    /// Value the editor wants to write
    pub proposed_value: Value,
    /// Submission timestamp
    pub submitted_at: DateTime<Utc>,
}

impl EditIntent {
    /// Create a new intent.
    #[must_use]
    pub fn new(
        key: FieldKey,
        session_id: SessionId,
        user: UserRef,
        original_value: Value,
        proposed_value: Value,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: IntentId::new(),
            key,
            session_id,
            user,
            original_value,
            proposed_value,
            submitted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intent_id_unique() {
        assert_ne!(IntentId::new(), IntentId::new());
    }

    #[test]
    fn test_intent_roundtrips_through_json() {
        let intent = EditIntent::new(
            FieldKey::new("products", "42", "price"),
            SessionId::new(),
            UserRef::new("u1", "Alice"),
            json!(10.0),
            json!(12.0),
            Utc::now(),
        );

        let encoded = serde_json::to_string(&intent).unwrap();
        let decoded: EditIntent = serde_json::from_str(&encoded).unwrap();
        assert_eq!(intent, decoded);
    }
}
