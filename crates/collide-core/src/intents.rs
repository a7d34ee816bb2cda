//! Edit intent ingestion and the open-intents index.
//!
//! One index instance lives inside each per-record slot, so all access is
//! already serialized by the slot lock. Admission validates and stores an
//! intent; it never writes to the persistent record store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{EditIntent, IntentId, SessionId};

/// Reject empty key parts before an intent is even constructed.
pub(crate) fn validate_key_parts(table: &str, record_id: &str, field: &str) -> Result<()> {
    for (name, value) in [
        ("recordTable", table),
        ("recordId", record_id),
        ("fieldName", field),
    ] {
        if value.trim().is_empty() {
            return Err(Error::InvalidInput(format!("{name} must not be empty")));
        }
    }
    Ok(())
}

/// Open intents for one record, keyed by field then session.
///
/// Last write per session wins: a later intent from the same session on the
/// same field replaces the earlier one for the purpose of conflict
/// comparison.
#[derive(Debug, Default)]
pub(crate) struct OpenIntents {
    by_field: HashMap<String, HashMap<SessionId, EditIntent>>,
    last_seen: HashMap<(SessionId, String), DateTime<Utc>>,
}

impl OpenIntents {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Admit an intent into the index.
    ///
    /// Rejects `StaleIntent` when the timestamp is older than the last known
    /// intent from the same session on the same field. Equal timestamps are
    /// accepted; sub-millisecond keystrokes can legitimately collide.
    pub(crate) fn admit(&mut self, intent: EditIntent) -> Result<IntentId> {
        let seen_key = (intent.session_id, intent.key.field.clone());
        if let Some(last) = self.last_seen.get(&seen_key) {
            if intent.submitted_at < *last {
                tracing::warn!(
                    key = %intent.key,
                    session = %intent.session_id,
                    "rejected out-of-order intent"
                );
                return Err(Error::StaleIntent(format!(
                    "intent for {} at {} is older than last seen {}",
                    intent.key, intent.submitted_at, last
                )));
            }
        }
        self.last_seen.insert(seen_key, intent.submitted_at);

        let id = intent.id;
        self.by_field
            .entry(intent.key.field.clone())
            .or_default()
            .insert(intent.session_id, intent);
        Ok(id)
    }

    /// All open intents for a field, ordered by (timestamp, session id).
    pub(crate) fn open_for_field(&self, field: &str) -> Vec<EditIntent> {
        let mut intents: Vec<EditIntent> = self
            .by_field
            .get(field)
            .map(|per_session| per_session.values().cloned().collect())
            .unwrap_or_default();
        intents.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        intents
    }

    /// The original value a session started from on a field, if it already
    /// has an open intent there.
    pub(crate) fn original_for(&self, session_id: SessionId, field: &str) -> Option<Value> {
        self.by_field
            .get(field)?
            .get(&session_id)
            .map(|intent| intent.original_value.clone())
    }

    /// Drop all of a session's open intents and its timestamp history.
    /// Session ids never recur, so keeping `last_seen` for a closed session
    /// would only leak memory. Returns the affected fields.
    pub(crate) fn remove_session(&mut self, session_id: SessionId) -> Vec<String> {
        let mut touched = Vec::new();
        self.by_field.retain(|field, per_session| {
            if per_session.remove(&session_id).is_some() {
                touched.push(field.clone());
            }
            !per_session.is_empty()
        });
        self.last_seen.retain(|(session, _), _| *session != session_id);
        touched
    }

    /// Clear a field's open intents after a resolution settles them.
    pub(crate) fn clear_field(&mut self, field: &str) {
        self.by_field.remove(field);
    }

    /// Whether the index holds no state at all.
    pub(crate) fn is_empty(&self) -> bool {
        self.by_field.is_empty() && self.last_seen.is_empty()
    }
}
