//! Conflict model and lifecycle states

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::intent::EditIntent;
use super::key::FieldKey;
use super::session::SessionId;

/// A unique identifier for a conflict, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new unique conflict ID using UUID v7
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

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Severity of a conflict, driving auto- vs. manual resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Whether the engine may resolve conflicts of this severity without a
    /// human decision.
    #[must_use]
    pub const fn is_auto_resolvable(self) -> bool {
        matches!(self, Self::Low | Self::Medium)
    }

    /// Lowercase name used in logs and CLI output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a conflict.
///
/// `Detected -> AutoResolving -> Resolved` for auto-resolvable severities,
/// `Detected -> PendingManual -> Resolved` otherwise, `-> Discarded` when all
/// contributing sessions close unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictState {
    Detected,
    AutoResolving,
    PendingManual,
    Resolved,
    Discarded,
}

impl fmt::Display for ConflictState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Detected => "detected",
            Self::AutoResolving => "auto_resolving",
            Self::PendingManual => "pending_manual",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        };
        f.write_str(name)
    }
}

/// Why a conflict left the active set without a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Fewer than two divergent proposed values remained (editors converged
    /// or withdrew)
    Dissolved,
    /// Every contributing session closed before a resolution was applied
    Abandoned,
}

/// A detected collision between two or more open intents on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Unique conflict identifier
    pub id: ConflictId,
    /// Field the conflict is about
    pub key: FieldKey,
    /// Contributing intents ordered by (timestamp, session id)
    pub intents: Vec<EditIntent>,
    /// Classified severity
    pub severity: Severity,
    /// Current lifecycle state
    pub state: ConflictState,
    /// When the conflict was first detected
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    /// Create a newly detected conflict over the given intents.
    ///
    /// Intents are ordered by submission timestamp ascending, ties broken by
    /// session id, so downstream classification and resolution stay
    /// deterministic.
    #[must_use]
    pub fn new(
        key: FieldKey,
        mut intents: Vec<EditIntent>,
        severity: Severity,
        detected_at: DateTime<Utc>,
    ) -> Self {
        sort_intents(&mut intents);
        Self {
            id: ConflictId::new(),
            key,
            intents,
            severity,
            state: ConflictState::Detected,
            detected_at,
        }
    }

    /// Replace the contributing intents, preserving identity and state.
    pub fn replace_intents(&mut self, mut intents: Vec<EditIntent>) {
        sort_intents(&mut intents);
        self.intents = intents;
    }

    /// Drop a session's contribution. Returns `true` if an intent was removed.
    pub fn remove_session(&mut self, session_id: SessionId) -> bool {
        let before = self.intents.len();
        self.intents.retain(|intent| intent.session_id != session_id);
        self.intents.len() != before
    }

    /// Distinct proposed values in arrival order.
    #[must_use]
    pub fn distinct_proposed(&self) -> Vec<&Value> {
        let mut seen: Vec<&Value> = Vec::new();
        for intent in &self.intents {
            if !seen.contains(&&intent.proposed_value) {
                seen.push(&intent.proposed_value);
            }
        }
        seen
    }

    /// Whether at least two distinct proposed values are still in play.
    #[must_use]
    pub fn is_divergent(&self) -> bool {
        self.distinct_proposed().len() >= 2
    }

    /// Whether contributing editors started from different original values,
    /// meaning at least one edited data already superseded by a committed
    /// change.
    #[must_use]
    pub fn stale_base(&self) -> bool {
        let mut seen: Vec<&Value> = Vec::new();
        for intent in &self.intents {
            if !seen.contains(&&intent.original_value) {
                seen.push(&intent.original_value);
            }
        }
        seen.len() > 1
    }

    /// Most recently submitted intent.
    #[must_use]
    pub fn newest_intent(&self) -> Option<&EditIntent> {
        self.intents.last()
    }

    /// The open intent contributed by a given user, if any.
    #[must_use]
    pub fn intent_for_user(&self, user_id: &str) -> Option<&EditIntent> {
        self.intents.iter().find(|intent| intent.user.id == user_id)
    }

    /// Most recent intent from any user other than the given one.
    #[must_use]
    pub fn newest_intent_not_from(&self, user_id: &str) -> Option<&EditIntent> {
        self.intents
            .iter()
            .rev()
            .find(|intent| intent.user.id != user_id)
    }

    /// Whether the conflict is still in the active set.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(
            self.state,
            ConflictState::Detected | ConflictState::AutoResolving | ConflictState::PendingManual
        )
    }
}

fn sort_intents(intents: &mut [EditIntent]) {
    intents.sort_by(|a, b| {
        a.submitted_at
            .cmp(&b.submitted_at)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRef;
    use chrono::Duration;
    use serde_json::json;

    fn intent(
        session: SessionId,
        user: &str,
        original: Value,
        proposed: Value,
        at: DateTime<Utc>,
    ) -> EditIntent {
        EditIntent::new(
            FieldKey::new("products", "42", "price"),
            session,
            UserRef::new(user, user),
            original,
            proposed,
            at,
        )
    }

    #[test]
    fn test_intents_ordered_by_timestamp_then_session() {
        let now = Utc::now();
        let s1 = SessionId::new();
        let s2 = SessionId::new();
        let s3 = SessionId::new();
        let (first, second) = if s2 < s3 { (s2, s3) } else { (s3, s2) };

        let conflict = Conflict::new(
            FieldKey::new("products", "42", "price"),
            vec![
                intent(s1, "a", json!(1), json!(2), now + Duration::seconds(5)),
                intent(second, "b", json!(1), json!(3), now),
                intent(first, "c", json!(1), json!(4), now),
            ],
            Severity::Low,
            now,
        );

        assert_eq!(conflict.intents[0].session_id, first);
        assert_eq!(conflict.intents[1].session_id, second);
        assert_eq!(conflict.intents[2].session_id, s1);
    }

    #[test]
    fn test_distinct_proposed_deduplicates() {
        let now = Utc::now();
        let conflict = Conflict::new(
            FieldKey::new("products", "42", "price"),
            vec![
                intent(SessionId::new(), "a", json!(1), json!(2), now),
                intent(SessionId::new(), "b", json!(1), json!(2), now),
                intent(SessionId::new(), "c", json!(1), json!(3), now),
            ],
            Severity::Low,
            now,
        );

        assert_eq!(conflict.distinct_proposed().len(), 2);
        assert!(conflict.is_divergent());
    }

    #[test]
    fn test_stale_base_detects_divergent_originals() {
        let now = Utc::now();
        let same_base = Conflict::new(
            FieldKey::new("products", "42", "category"),
            vec![
                intent(SessionId::new(), "a", json!("Snacks"), json!("Chips"), now),
                intent(SessionId::new(), "b", json!("Snacks"), json!("Candy"), now),
            ],
            Severity::Low,
            now,
        );
        assert!(!same_base.stale_base());

        let divergent_base = Conflict::new(
            FieldKey::new("products", "42", "category"),
            vec![
                intent(SessionId::new(), "a", json!("Snacks"), json!("Chips"), now),
                intent(
                    SessionId::new(),
                    "b",
                    json!("Beverages"),
                    json!("Candy"),
                    now,
                ),
            ],
            Severity::Low,
            now,
        );
        assert!(divergent_base.stale_base());
    }

    #[test]
    fn test_remove_session_drops_contribution() {
        let now = Utc::now();
        let s1 = SessionId::new();
        let mut conflict = Conflict::new(
            FieldKey::new("products", "42", "price"),
            vec![
                intent(s1, "a", json!(1), json!(2), now),
                intent(SessionId::new(), "b", json!(1), json!(3), now),
            ],
            Severity::Low,
            now,
        );

        assert!(conflict.remove_session(s1));
        assert!(!conflict.is_divergent());
        assert!(!conflict.remove_session(s1));
    }

    #[test]
    fn test_severity_auto_resolve_boundary() {
        assert!(Severity::Low.is_auto_resolvable());
        assert!(Severity::Medium.is_auto_resolvable());
        assert!(!Severity::High.is_auto_resolvable());
        assert!(!Severity::Critical.is_auto_resolvable());
    }
}
