//! collide-core - Core library for Collide
//!
//! This crate contains the shared models, the edit-intent and presence
//! bookkeeping, and the conflict detection/resolution engine used by all
//! Collide interfaces.

pub mod audit;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod presence;
pub mod store;

mod detector;
mod intents;
mod resolve;

pub use config::{EngineConfig, FieldTier, FieldTiers};
pub use engine::{ConflictEngine, ConflictFilter, SubmitOutcome};
pub use error::{Error, Result};
pub use events::{EngineEvent, SessionCloseReason};
pub use models::{
    Conflict, ConflictId, ConflictState, DiscardReason, EditIntent, EditSession, FieldKey,
    IntentId, RecordKey, Resolution, ResolutionStrategy, ResolvedBy, Severity, SessionId, UserRef,
};
pub use store::{FieldStore, MemoryFieldStore};
