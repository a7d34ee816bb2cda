//! Resolution model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// How a conflict's resolved value was chosen.
///
/// Modeled as a tagged variant rather than callback dispatch so handling is
/// exhaustive and testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Combine all distinct proposed values
    Merge,
    /// Keep the requesting editor's value
    UserWins,
    /// Keep another editor's (most recent) value
    OtherWins,
    /// Caller supplies an arbitrary resolved value (e.g. a hand-merged result)
    Manual,
}

impl ResolutionStrategy {
    /// Lowercase name used in logs, audit entries, and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::UserWins => "user_wins",
            Self::OtherWins => "other_wins",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(Self::Merge),
            "user_wins" => Ok(Self::UserWins),
            "other_wins" => Ok(Self::OtherWins),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown resolution strategy '{other}'")),
        }
    }
}

/// Who decided a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    /// Auto-resolved by the engine
    System,
    /// Manually resolved by the given user id
    User(String),
}

impl fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Terminal outcome applied to a conflict. Created exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Strategy that produced the resolved value
    pub strategy: ResolutionStrategy,
    /// Value committed to the record store
    pub resolved_value: Value,
    /// Human-readable reasoning recorded for the audit trail
    pub reasoning: String,
    /// Who decided
    pub resolved_by: ResolvedBy,
    /// When the decision was made
    pub resolved_at: DateTime<Utc>,
}

impl Resolution {
    /// Create a resolution record.
    #[must_use]
    pub fn new(
        strategy: ResolutionStrategy,
        resolved_value: Value,
        reasoning: impl Into<String>,
        resolved_by: ResolvedBy,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            strategy,
            resolved_value,
            reasoning: reasoning.into(),
            resolved_by,
            resolved_at,
        }
    }
}
