//! Append-only audit log and derived statistics.
//!
//! Every resolution and discard is recorded; statistics are derived over a
//! sliding window and can be recomputed from the log at any time — the log
//! is the authoritative record, the numbers never are.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::models::{ConflictId, DiscardReason, FieldKey, Resolution, Severity};

/// Terminal outcome recorded for a conflict.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// A resolution was applied and committed
    Resolved { resolution: Resolution },
    /// The conflict left the active set with no resolution applied
    Discarded { reason: DiscardReason },
}

/// One immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    /// Conflict the entry is about
    pub conflict_id: ConflictId,
    /// Field the conflict was on
    pub key: FieldKey,
    /// Severity at the time the conflict ended
    pub severity: Severity,
    /// When the conflict was detected
    pub detected_at: DateTime<Utc>,
    /// How the conflict ended
    pub outcome: AuditOutcome,
    /// When the entry was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Aggregated conflict-rate metrics over a sliding window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    /// Conflicts detected within the window
    pub total_conflicts: usize,
    /// Of those, how many were resolved (rest discarded or still open)
    pub resolved_count: usize,
    /// Mean detection-to-resolution latency in milliseconds
    pub average_resolution_latency_ms: Option<f64>,
    /// Detection rate normalized to conflicts per hour
    pub conflicts_per_hour: f64,
}

/// Append-only log of conflict outcomes.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl AuditLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub async fn record(&self, entry: AuditEntry) {
        tracing::debug!(
            conflict = %entry.conflict_id,
            key = %entry.key,
            severity = %entry.severity,
            "audit entry recorded"
        );
        self.entries.write().await.push(entry);
    }

    /// Full copy of the log, oldest first. Replayable: `statistics` can be
    /// reproduced from this snapshot alone.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    /// Compute statistics over entries whose conflicts were detected within
    /// `window` of `now`.
    pub async fn statistics(&self, window: Duration, now: DateTime<Utc>) -> Statistics {
        let cutoff = now - window;
        let entries = self.entries.read().await;

        let mut total = 0_usize;
        let mut resolved = 0_usize;
        let mut latency_sum_ms = 0.0_f64;

        for entry in entries.iter().filter(|entry| entry.detected_at >= cutoff) {
            total += 1;
            if let AuditOutcome::Resolved { resolution } = &entry.outcome {
                resolved += 1;
                latency_sum_ms +=
                    (resolution.resolved_at - entry.detected_at).num_milliseconds() as f64;
            }
        }

        let average_resolution_latency_ms = if resolved > 0 {
            Some(latency_sum_ms / resolved as f64)
        } else {
            None
        };

        let window_hours = window.num_milliseconds() as f64 / 3_600_000.0;
        let conflicts_per_hour = if window_hours > 0.0 {
            total as f64 / window_hours
        } else {
            0.0
        };

        Statistics {
            total_conflicts: total,
            resolved_count: resolved,
            average_resolution_latency_ms,
            conflicts_per_hour,
        }
    }
}
