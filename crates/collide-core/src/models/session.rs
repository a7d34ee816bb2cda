//! Edit session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::key::RecordKey;

/// A unique identifier for an edit session, using UUID v7 (time-sortable)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new unique session ID using UUID v7
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

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identity of the user behind a session, supplied by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// Stable user identifier
    pub id: String,
    /// Display name for audit entries and presence snapshots
    pub name: String,
}

impl UserRef {
    /// Create a user reference from id and display name.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One user's active edit context on one record.
///
/// At most one session exists per (user, record) pair at a time; the presence
/// tracker enforces that invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSession {
    /// Unique session identifier
    pub id: SessionId,
    /// User behind the session
    pub user: UserRef,
    /// Record being edited
    pub record: RecordKey,
    /// Fields this session has touched
    pub active_fields: HashSet<String>,
    /// When the session was opened
    pub started_at: DateTime<Utc>,
    /// Last activity timestamp, refreshed on every intent
    pub last_activity: DateTime<Utc>,
}

impl EditSession {
    /// Open a new session for a user on a record.
    #[must_use]
    pub fn new(user: UserRef, record: RecordKey, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            user,
            record,
            active_fields: HashSet::new(),
            started_at: now,
            last_activity: now,
        }
    }

    /// Refresh activity and mark a field as actively edited.
    pub fn touch(&mut self, field: &str, now: DateTime<Utc>) {
        self.active_fields.insert(field.to_string());
        self.last_activity = now;
    }

    /// Whether the session has been inactive longer than `timeout`.
    #[must_use]
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity > timeout
    }
}
