//! Advisory presence tracking.
//!
//! Records which user is actively editing which record and for how long, and
//! expires sessions that go idle. Presence is context for the detector and
//! for display; it is never a locking mechanism.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::models::{EditSession, RecordKey, SessionId, UserRef};

/// Tracks open edit sessions, enforcing one session per (user, record).
#[derive(Debug)]
pub struct PresenceTracker {
    sessions: DashMap<SessionId, EditSession>,
    by_user: DashMap<(String, RecordKey), SessionId>,
    timeout: Duration,
}

impl PresenceTracker {
    /// Create a tracker with the given inactivity timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            by_user: DashMap::new(),
            timeout,
        }
    }

    /// Refresh (or create) the user's session on a record and mark the field
    /// active. Returns the session id.
    pub fn register_activity(
        &self,
        user: &UserRef,
        record: &RecordKey,
        field: &str,
        now: DateTime<Utc>,
    ) -> SessionId {
        let index_key = (user.id.clone(), record.clone());
        if let Some(existing) = self.by_user.get(&index_key) {
            let session_id = *existing;
            drop(existing);
            if let Some(mut session) = self.sessions.get_mut(&session_id) {
                session.touch(field, now);
                return session_id;
            }
        }

        let mut session = EditSession::new(user.clone(), record.clone(), now);
        session.touch(field, now);
        let session_id = session.id;
        self.by_user.insert(index_key, session_id);
        self.sessions.insert(session_id, session);
        tracing::debug!(%session_id, user = %user.id, record = %record, "opened edit session");
        session_id
    }

    /// Snapshot of a session by id.
    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<EditSession> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    /// Session id of a user's open session on a record, if any.
    #[must_use]
    pub fn session_for(&self, user_id: &str, record: &RecordKey) -> Option<SessionId> {
        self.by_user
            .get(&(user_id.to_string(), record.clone()))
            .map(|entry| *entry.value())
    }

    /// Close a session explicitly. Returns the removed session.
    pub fn close(&self, id: SessionId) -> Option<EditSession> {
        let (_, session) = self.sessions.remove(&id)?;
        self.by_user
            .remove(&(session.user.id.clone(), session.record.clone()));
        Some(session)
    }

    /// Remove sessions idle past the timeout. Returns the removed sessions.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> Vec<EditSession> {
        let stale: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle(now, self.timeout))
            .map(|entry| *entry.key())
            .collect();

        stale.into_iter().filter_map(|id| self.close(id)).collect()
    }

    /// Advisory snapshot of sessions currently touching a record.
    #[must_use]
    pub fn list_active_users(&self, record: &RecordKey) -> Vec<EditSession> {
        self.sessions
            .iter()
            .filter(|entry| &entry.value().record == record)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PresenceTracker {
        PresenceTracker::new(Duration::seconds(30))
    }

    #[test]
    fn test_one_session_per_user_and_record() {
        let tracker = tracker();
        let user = UserRef::new("u1", "Alice");
        let record = RecordKey::new("products", "42");
        let now = Utc::now();

        let first = tracker.register_activity(&user, &record, "price", now);
        let second = tracker.register_activity(&user, &record, "notes", now);
        assert_eq!(first, second);
        assert_eq!(tracker.len(), 1);

        let session = tracker.session(first).unwrap();
        assert!(session.active_fields.contains("price"));
        assert!(session.active_fields.contains("notes"));

        // A different record opens a separate session.
        let other = tracker.register_activity(&user, &RecordKey::new("products", "43"), "price", now);
        assert_ne!(first, other);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_expire_stale_removes_idle_sessions() {
        let tracker = tracker();
        let record = RecordKey::new("products", "42");
        let now = Utc::now();

        tracker.register_activity(&UserRef::new("u1", "Alice"), &record, "price", now);
        tracker.register_activity(
            &UserRef::new("u2", "Bob"),
            &record,
            "price",
            now + Duration::seconds(20),
        );

        let expired = tracker.expire_stale(now + Duration::seconds(40));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].user.id, "u1");
        assert_eq!(tracker.len(), 1);

        // Index entry is gone too: a new session is created on re-activity.
        let reopened = tracker.register_activity(
            &UserRef::new("u1", "Alice"),
            &record,
            "price",
            now + Duration::seconds(41),
        );
        assert_ne!(Some(reopened), tracker.session_for("u2", &record));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_list_active_users_filters_by_record() {
        let tracker = tracker();
        let now = Utc::now();
        let record = RecordKey::new("products", "42");

        tracker.register_activity(&UserRef::new("u1", "Alice"), &record, "price", now);
        tracker.register_activity(
            &UserRef::new("u2", "Bob"),
            &RecordKey::new("products", "43"),
            "price",
            now,
        );

        let active = tracker.list_active_users(&record);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user.id, "u1");
    }

    #[test]
    fn test_close_removes_session_and_index() {
        let tracker = tracker();
        let user = UserRef::new("u1", "Alice");
        let record = RecordKey::new("products", "42");
        let id = tracker.register_activity(&user, &record, "price", Utc::now());

        let closed = tracker.close(id).unwrap();
        assert_eq!(closed.id, id);
        assert!(tracker.is_empty());
        assert_eq!(tracker.session_for("u1", &record), None);
    }
}
