//! Data models for Collide

mod conflict;
mod intent;
mod key;
mod resolution;
mod session;

pub use conflict::{Conflict, ConflictId, ConflictState, DiscardReason, Severity};
pub use intent::{EditIntent, IntentId};
pub use key::{FieldKey, RecordKey};
pub use resolution::{Resolution, ResolutionStrategy, ResolvedBy};
pub use session::{EditSession, SessionId, UserRef};
