//! Engine configuration.
//!
//! Deserializable so host applications can load it from their own config
//! files; every field has a sensible default and `validate` rejects values
//! the engine cannot run with.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_PRESENCE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 2;
const DEFAULT_DIVERGENCE_THRESHOLD: f64 = 0.5;
const DEFAULT_APPLY_RETRY_DELAY_MS: u64 = 100;
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Static sensitivity classification of a field, supplied by the schema
/// owner. Monetary or identity-bearing fields belong in `High`; free-text
/// notes in `Low`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTier {
    Low,
    #[default]
    Medium,
    High,
}

/// Per-field sensitivity tiers.
///
/// Keys are either a bare field name (`price`) or table-qualified
/// (`products.price`); the qualified form takes precedence. Unlisted fields
/// default to `Medium`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTiers {
    #[serde(default)]
    fields: HashMap<String, FieldTier>,
}

impl FieldTiers {
    /// Empty tier table; every field classifies as `Medium`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper to register a field's tier.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, tier: FieldTier) -> Self {
        self.fields.insert(name.into(), tier);
        self
    }

    /// Look up the tier for a field, preferring the table-qualified entry.
    #[must_use]
    pub fn tier_of(&self, table: &str, field: &str) -> FieldTier {
        let qualified = format!("{table}.{field}");
        self.fields
            .get(&qualified)
            .or_else(|| self.fields.get(field))
            .copied()
            .unwrap_or_default()
    }
}

/// Tunable parameters for the conflict engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Seconds of inactivity after which an edit session expires
    #[serde(default = "default_presence_timeout_secs")]
    pub presence_timeout_secs: u64,
    /// Seconds between background sweeps driving expiry and dissolution
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Global switch for auto-resolving low/medium conflicts
    #[serde(default = "default_auto_resolve")]
    pub auto_resolve: bool,
    /// Relative numeric divergence above which a conflict escalates to high
    #[serde(default = "default_divergence_threshold")]
    pub divergence_threshold: f64,
    /// Delay before the single automatic retry of a failed persistence write
    #[serde(default = "default_apply_retry_delay_ms")]
    pub apply_retry_delay_ms: u64,
    /// Buffered capacity of the engine event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Per-field sensitivity tiers
    #[serde(default)]
    pub field_tiers: FieldTiers,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            presence_timeout_secs: DEFAULT_PRESENCE_TIMEOUT_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            auto_resolve: true,
            divergence_threshold: DEFAULT_DIVERGENCE_THRESHOLD,
            apply_retry_delay_ms: DEFAULT_APPLY_RETRY_DELAY_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            field_tiers: FieldTiers::default(),
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.presence_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "presence_timeout_secs must be positive".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        if !self.divergence_threshold.is_finite() || self.divergence_threshold <= 0.0 {
            return Err(Error::InvalidInput(
                "divergence_threshold must be a positive finite number".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidInput(
                "event_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Inactivity threshold as a chrono duration.
    #[must_use]
    pub fn presence_timeout(&self) -> Duration {
        Duration::seconds(i64::try_from(self.presence_timeout_secs).unwrap_or(i64::MAX))
    }

    /// Sweep period for the background timer.
    #[must_use]
    pub const fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sweep_interval_secs)
    }

    /// Delay before retrying a failed persistence write.
    #[must_use]
    pub const fn apply_retry_delay(&self) -> StdDuration {
        StdDuration::from_millis(self.apply_retry_delay_ms)
    }
}

fn default_presence_timeout_secs() -> u64 {
    DEFAULT_PRESENCE_TIMEOUT_SECS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

const fn default_auto_resolve() -> bool {
    true
}

fn default_divergence_threshold() -> f64 {
    DEFAULT_DIVERGENCE_THRESHOLD
}

fn default_apply_retry_delay_ms() -> u64 {
    DEFAULT_APPLY_RETRY_DELAY_MS
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}
