//! Engine facade wiring ingestion, detection, classification, and
//! resolution over per-record state.
//!
//! Shared state is keyed by record: each record owns a slot guarded by its
//! own lock, so editors of different records never block each other while
//! operations on the same record are serialized. The engine exclusively owns
//! conflict state transitions; everything it hands out is a snapshot.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::audit::{AuditEntry, AuditLog, AuditOutcome, Statistics};
use crate::classify::classify;
use crate::config::EngineConfig;
use crate::detector::{detect, Detection};
use crate::error::{Error, Result};
use crate::events::{EngineEvent, EventBus, SessionCloseReason};
use crate::intents::{validate_key_parts, OpenIntents};
use crate::models::{
    Conflict, ConflictId, ConflictState, DiscardReason, EditIntent, EditSession, FieldKey,
    IntentId, RecordKey, Resolution, ResolutionStrategy, UserRef,
};
use crate::presence::PresenceTracker;
use crate::resolve::{auto_resolution, manual_resolution};
use crate::store::FieldStore;

/// Result of submitting an edit.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    /// Identifier of the admitted intent
    pub intent_id: IntentId,
    /// Open conflict on the field after processing, if one exists
    pub conflict: Option<Conflict>,
    /// Resolution applied synchronously by the auto-resolution policy
    pub auto_resolution: Option<Resolution>,
}

/// Filter for `list_conflicts`.
#[derive(Debug, Clone, Default)]
pub struct ConflictFilter {
    /// Restrict to a table
    pub table: Option<String>,
    /// Restrict to a record id
    pub record_id: Option<String>,
    /// Restrict to a lifecycle state
    pub state: Option<ConflictState>,
}

impl ConflictFilter {
    fn matches(&self, conflict: &Conflict) -> bool {
        self.table
            .as_deref()
            .is_none_or(|table| conflict.key.table() == table)
            && self
                .record_id
                .as_deref()
                .is_none_or(|id| conflict.key.record_id() == id)
            && self.state.is_none_or(|state| conflict.state == state)
    }
}

/// Per-record shared state: the open-intents index and active conflicts,
/// guarded together by one lock.
#[derive(Debug, Default)]
struct RecordSlot {
    open: OpenIntents,
    conflicts: std::collections::HashMap<String, Conflict>,
}

/// The conflict engine.
pub struct ConflictEngine {
    config: EngineConfig,
    store: Arc<dyn FieldStore>,
    presence: PresenceTracker,
    slots: DashMap<RecordKey, Arc<Mutex<RecordSlot>>>,
    conflict_index: DashMap<ConflictId, RecordKey>,
    audit: AuditLog,
    events: EventBus,
}

impl ConflictEngine {
    /// Create an engine over the given record store.
    pub fn new(config: EngineConfig, store: Arc<dyn FieldStore>) -> Result<Self> {
        config.validate()?;
        let presence = PresenceTracker::new(config.presence_timeout());
        let events = EventBus::new(config.event_capacity);
        Ok(Self {
            config,
            store,
            presence,
            slots: DashMap::new(),
            conflict_index: DashMap::new(),
            audit: AuditLog::new(),
            events,
        })
    }

    /// Subscribe to the engine event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Advisory snapshot of sessions currently editing a record.
    #[must_use]
    pub fn list_active_users(&self, table: &str, record_id: &str) -> Vec<EditSession> {
        self.presence
            .list_active_users(&RecordKey::new(table, record_id))
    }

    /// Submit a proposed field write on behalf of a user.
    ///
    /// Refreshes the user's presence, captures the session's baseline value
    /// on its first touch of the field, admits the intent, and runs
    /// detection. Low/medium conflicts are auto-resolved synchronously when
    /// the global setting allows it.
    pub async fn submit_edit(
        &self,
        user: &UserRef,
        table: &str,
        record_id: &str,
        field: &str,
        proposed_value: Value,
    ) -> Result<SubmitOutcome> {
        validate_key_parts(table, record_id, field)?;
        let key = FieldKey::new(table, record_id, field);
        let now = Utc::now();

        let session_id = self
            .presence
            .register_activity(user, &key.record, field, now);

        let slot = self.slot(&key.record);
        let mut guard = slot.lock().await;

        // The session's view of the prior value: fixed at its first intent
        // on the field, read from the committed store.
        let original_value = match guard.open.original_for(session_id, field) {
            Some(value) => value,
            None => self.store.read_field(&key).await?.unwrap_or(Value::Null),
        };

        let intent = EditIntent::new(
            key.clone(),
            session_id,
            user.clone(),
            original_value,
            proposed_value,
            now,
        );
        let intent_id = guard.open.admit(intent)?;

        let open = guard.open.open_for_field(field);
        let existing = guard.conflicts.get(field).cloned();

        let outcome = match detect(&open, existing.as_ref(), &key, now) {
            Detection::None => SubmitOutcome {
                intent_id,
                conflict: None,
                auto_resolution: None,
            },
            Detection::Dissolved(conflict) => {
                self.discard_conflict(&mut guard, field, conflict, DiscardReason::Dissolved)
                    .await;
                SubmitOutcome {
                    intent_id,
                    conflict: None,
                    auto_resolution: None,
                }
            }
            Detection::Created(mut conflict) => {
                conflict.severity = classify(
                    &conflict,
                    &self.config.field_tiers,
                    self.config.divergence_threshold,
                );
                tracing::info!(
                    conflict = %conflict.id,
                    key = %conflict.key,
                    severity = %conflict.severity,
                    "conflict detected"
                );
                self.events.publish(EngineEvent::ConflictDetected {
                    conflict: conflict.clone(),
                });
                self.settle_new_conflict(&mut guard, field, conflict, intent_id)
                    .await
            }
            Detection::Updated(mut conflict) => {
                conflict.severity = classify(
                    &conflict,
                    &self.config.field_tiers,
                    self.config.divergence_threshold,
                );
                guard.conflicts.insert(field.to_string(), conflict.clone());
                self.events.publish(EngineEvent::ConflictDetected {
                    conflict: conflict.clone(),
                });
                SubmitOutcome {
                    intent_id,
                    conflict: Some(conflict),
                    auto_resolution: None,
                }
            }
        };

        Ok(outcome)
    }

    /// Apply a human decision to a pending conflict.
    ///
    /// Only conflicts in `PendingManual` can be resolved here; anything else
    /// is reported as `UnknownConflict` without touching state.
    pub async fn resolve_manually(
        &self,
        conflict_id: ConflictId,
        strategy: ResolutionStrategy,
        resolved_value: Option<Value>,
        user: &UserRef,
    ) -> Result<Resolution> {
        let record = self
            .conflict_index
            .get(&conflict_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UnknownConflict(conflict_id.to_string()))?;

        let slot = self.slot(&record);
        let mut guard = slot.lock().await;

        let (field, conflict) = guard
            .conflicts
            .iter()
            .find(|(_, conflict)| conflict.id == conflict_id)
            .map(|(field, conflict)| (field.clone(), conflict.clone()))
            .ok_or_else(|| Error::UnknownConflict(conflict_id.to_string()))?;

        if conflict.state != ConflictState::PendingManual {
            return Err(Error::UnknownConflict(conflict_id.to_string()));
        }

        let resolution = manual_resolution(&conflict, strategy, resolved_value, user, Utc::now())?;

        // On write failure the conflict stays PendingManual for a later
        // manual retry; the error also reaches subscribers as ApplyFailed.
        self.try_apply(conflict_id, &conflict.key, &resolution.resolved_value)
            .await?;

        self.finish_resolved(&mut guard, &field, conflict, resolution.clone())
            .await;
        Ok(resolution)
    }

    /// Conflicts currently known to the engine, filtered and ordered by
    /// detection time.
    pub async fn list_conflicts(&self, filter: &ConflictFilter) -> Vec<Conflict> {
        let slots: Vec<Arc<Mutex<RecordSlot>>> = self
            .slots
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut conflicts = Vec::new();
        for slot in slots {
            let guard = slot.lock().await;
            conflicts.extend(
                guard
                    .conflicts
                    .values()
                    .filter(|conflict| filter.matches(conflict))
                    .cloned(),
            );
        }
        conflicts.sort_by_key(|conflict| conflict.detected_at);
        conflicts
    }

    /// Aggregated metrics over the trailing `window`.
    pub async fn statistics(&self, window: Duration) -> Statistics {
        self.audit.statistics(window, Utc::now()).await
    }

    /// Replayable audit trail.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.entries().await
    }

    /// Close a user's session on a record explicitly. Returns whether a
    /// session was open.
    pub async fn close_session(&self, user_id: &str, table: &str, record_id: &str) -> bool {
        let record = RecordKey::new(table, record_id);
        let Some(session_id) = self.presence.session_for(user_id, &record) else {
            return false;
        };
        let Some(session) = self.presence.close(session_id) else {
            return false;
        };
        self.handle_session_closed(session, SessionCloseReason::Explicit)
            .await;
        self.evict_idle_slots();
        true
    }

    /// Expire idle sessions and dissolve conflicts they were carrying.
    /// Returns the number of sessions closed.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> usize {
        let expired = self.presence.expire_stale(now);
        let count = expired.len();
        for session in expired {
            self.handle_session_closed(session, SessionCloseReason::Expired)
                .await;
        }
        self.evict_idle_slots();
        count
    }

    /// Spawn the background sweep driving presence expiry. The only polling
    /// element; every other transition is event-driven.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let period = engine.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let closed = engine.expire_stale(Utc::now()).await;
                if closed > 0 {
                    tracing::debug!(closed, "expired idle edit sessions");
                }
            }
        })
    }

    fn slot(&self, record: &RecordKey) -> Arc<Mutex<RecordSlot>> {
        self.slots
            .entry(record.clone())
            .or_insert_with(|| Arc::new(Mutex::new(RecordSlot::default())))
            .clone()
    }

    /// Drop record slots that hold no intents and no conflicts, so session
    /// churn over many records cannot grow the map without bound. A slot is
    /// only removed while the map holds the last reference to it; a caller
    /// still working with the slot keeps it alive and it stays in the map.
    fn evict_idle_slots(&self) {
        self.slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(guard) => !guard.conflicts.is_empty() || !guard.open.is_empty(),
                Err(_) => true,
            }
        });
    }

    /// Route a freshly created conflict: auto-resolve it when policy allows,
    /// otherwise park it as pending manual.
    async fn settle_new_conflict(
        &self,
        guard: &mut RecordSlot,
        field: &str,
        mut conflict: Conflict,
        intent_id: IntentId,
    ) -> SubmitOutcome {
        if self.config.auto_resolve && conflict.severity.is_auto_resolvable() {
            conflict.state = ConflictState::AutoResolving;
            if let Some(resolution) = auto_resolution(&conflict, Utc::now()) {
                match self
                    .try_apply(conflict.id, &conflict.key, &resolution.resolved_value)
                    .await
                {
                    Ok(()) => {
                        self.finish_resolved(guard, field, conflict, resolution.clone())
                            .await;
                        return SubmitOutcome {
                            intent_id,
                            conflict: None,
                            auto_resolution: Some(resolution),
                        };
                    }
                    Err(error) => {
                        // Could not commit; park for a manual retry.
                        tracing::warn!(
                            conflict = %conflict.id,
                            %error,
                            "auto-resolution could not be applied"
                        );
                    }
                }
            }
        }

        conflict.state = ConflictState::PendingManual;
        guard.conflicts.insert(field.to_string(), conflict.clone());
        self.conflict_index
            .insert(conflict.id, conflict.key.record.clone());
        SubmitOutcome {
            intent_id,
            conflict: Some(conflict),
            auto_resolution: None,
        }
    }

    /// Commit a resolved value, retrying once after a short delay. A second
    /// failure surfaces on the event stream and as an error.
    async fn try_apply(
        &self,
        conflict_id: ConflictId,
        key: &FieldKey,
        value: &Value,
    ) -> Result<()> {
        match self.store.write_field(key, value).await {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::warn!(conflict = %conflict_id, error = %first, "persistence write failed, retrying once");
                tokio::time::sleep(self.config.apply_retry_delay()).await;
                match self.store.write_field(key, value).await {
                    Ok(()) => Ok(()),
                    Err(second) => {
                        let detail = second.to_string();
                        self.events.publish(EngineEvent::ApplyFailed {
                            conflict_id,
                            detail: detail.clone(),
                        });
                        Err(Error::PersistenceWrite(detail))
                    }
                }
            }
        }
    }

    /// Terminal bookkeeping after a resolution was committed: the conflict
    /// leaves the active set, the field's open intents are settled, and the
    /// outcome is audited and broadcast.
    async fn finish_resolved(
        &self,
        guard: &mut RecordSlot,
        field: &str,
        mut conflict: Conflict,
        resolution: Resolution,
    ) {
        conflict.state = ConflictState::Resolved;
        guard.conflicts.remove(field);
        guard.open.clear_field(field);
        self.conflict_index.remove(&conflict.id);

        tracing::info!(
            conflict = %conflict.id,
            key = %conflict.key,
            strategy = %resolution.strategy,
            resolved_by = %resolution.resolved_by,
            "conflict resolved"
        );
        self.audit
            .record(AuditEntry {
                conflict_id: conflict.id,
                key: conflict.key.clone(),
                severity: conflict.severity,
                detected_at: conflict.detected_at,
                outcome: AuditOutcome::Resolved {
                    resolution: resolution.clone(),
                },
                recorded_at: Utc::now(),
            })
            .await;
        self.events.publish(EngineEvent::ConflictResolved {
            conflict_id: conflict.id,
            resolution,
        });
    }

    /// Remove a conflict that ends without a resolution. A normal outcome of
    /// user abandonment, not an error.
    async fn discard_conflict(
        &self,
        guard: &mut RecordSlot,
        field: &str,
        mut conflict: Conflict,
        reason: DiscardReason,
    ) {
        conflict.state = ConflictState::Discarded;
        guard.conflicts.remove(field);
        self.conflict_index.remove(&conflict.id);

        tracing::info!(conflict = %conflict.id, key = %conflict.key, ?reason, "conflict discarded");
        self.audit
            .record(AuditEntry {
                conflict_id: conflict.id,
                key: conflict.key.clone(),
                severity: conflict.severity,
                detected_at: conflict.detected_at,
                outcome: AuditOutcome::Discarded { reason },
                recorded_at: Utc::now(),
            })
            .await;
        self.events.publish(EngineEvent::ConflictDiscarded {
            conflict_id: conflict.id,
            reason,
        });
    }

    /// Cancel a closed session's contribution to open conflicts and dissolve
    /// any that lose divergence.
    async fn handle_session_closed(&self, session: EditSession, reason: SessionCloseReason) {
        self.events.publish(EngineEvent::SessionClosed {
            session: session.clone(),
            reason,
        });

        let Some(slot) = self
            .slots
            .get(&session.record)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return;
        };
        let mut guard = slot.lock().await;

        let fields = guard.open.remove_session(session.id);
        for field in fields {
            let Some(existing) = guard.conflicts.get(&field).cloned() else {
                continue;
            };
            let open = guard.open.open_for_field(&field);
            match detect(&open, Some(&existing), &existing.key, Utc::now()) {
                Detection::Dissolved(conflict) => {
                    let reason = if open.is_empty() {
                        DiscardReason::Abandoned
                    } else {
                        DiscardReason::Dissolved
                    };
                    self.discard_conflict(&mut guard, &field, conflict, reason)
                        .await;
                }
                Detection::Updated(mut conflict) => {
                    conflict.severity = classify(
                        &conflict,
                        &self.config.field_tiers,
                        self.config.divergence_threshold,
                    );
                    guard.conflicts.insert(field.clone(), conflict);
                }
                // Detection over an existing conflict only updates or
                // dissolves it.
                Detection::None | Detection::Created(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryFieldStore;
    use serde_json::json;

    fn engine() -> ConflictEngine {
        ConflictEngine::new(EngineConfig::default(), Arc::new(MemoryFieldStore::new())).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_single_editor_never_conflicts() {
        let engine = engine();
        let alice = UserRef::new("u1", "Alice");

        let outcome = engine
            .submit_edit(&alice, "products", "42", "price", json!(12.0))
            .await
            .unwrap();

        assert!(outcome.conflict.is_none());
        assert!(outcome.auto_resolution.is_none());
        assert!(engine.list_conflicts(&ConflictFilter::default()).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_submit_rejects_empty_key_parts() {
        let engine = engine();
        let alice = UserRef::new("u1", "Alice");

        let result = engine
            .submit_edit(&alice, "", "42", "price", json!(12.0))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolve_manually_unknown_conflict() {
        let engine = engine();
        let result = engine
            .resolve_manually(
                ConflictId::new(),
                ResolutionStrategy::Manual,
                Some(json!(1)),
                &UserRef::new("u1", "Alice"),
            )
            .await;
        assert!(matches!(result, Err(Error::UnknownConflict(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_idle_record_state_is_evicted_on_expiry() {
        let engine = engine();
        let alice = UserRef::new("u1", "Alice");

        engine
            .submit_edit(&alice, "products", "42", "price", json!(12.0))
            .await
            .unwrap();
        assert_eq!(engine.slots.len(), 1);

        let closed = engine
            .expire_stale(Utc::now() + Duration::seconds(120))
            .await;
        assert_eq!(closed, 1);
        assert!(engine.slots.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_eviction_keeps_slots_with_open_state() {
        let engine = engine();

        engine
            .submit_edit(&UserRef::new("u1", "Alice"), "products", "42", "notes", json!("a"))
            .await
            .unwrap();
        engine.evict_idle_slots();
        assert_eq!(engine.slots.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_per_record_slots_are_independent() {
        let engine = engine();
        let alice = UserRef::new("u1", "Alice");
        let bob = UserRef::new("u2", "Bob");

        // Divergent edits on *different* records never conflict.
        engine
            .submit_edit(&alice, "products", "42", "price", json!(12.0))
            .await
            .unwrap();
        let outcome = engine
            .submit_edit(&bob, "products", "43", "price", json!(11.5))
            .await
            .unwrap();

        assert!(outcome.conflict.is_none());
        assert_eq!(engine.list_active_users("products", "42").len(), 1);
        assert_eq!(engine.list_active_users("products", "43").len(), 1);
    }
}
