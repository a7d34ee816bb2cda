//! Scenario files and the replay runner.
//!
//! A scenario is a JSON description of seeded field values and a sequence of
//! edit steps, replayed against an engine over an in-memory store. Useful
//! for demonstrating and debugging classification policy without a host
//! application.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use collide_core::audit::{AuditEntry, AuditOutcome, Statistics};
use collide_core::{
    Conflict, ConflictEngine, ConflictFilter, ConflictState, EngineConfig, FieldKey,
    MemoryFieldStore, Resolution, ResolutionStrategy, UserRef,
};

use crate::CliError;

/// A replayable edit scenario.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Committed field values present before any edit
    #[serde(default)]
    pub seed: Vec<SeedField>,
    /// Edit steps, applied in order
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedField {
    pub table: String,
    pub record: String,
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    /// A user proposes a new value for a field
    Submit {
        user: String,
        #[serde(default)]
        name: Option<String>,
        table: String,
        record: String,
        field: String,
        value: Value,
    },
    /// A user closes their session on a record
    Close {
        user: String,
        table: String,
        record: String,
    },
    /// A user resolves the pending conflict on a field
    Resolve {
        user: String,
        #[serde(default)]
        name: Option<String>,
        table: String,
        record: String,
        field: String,
        strategy: String,
        #[serde(default)]
        value: Option<Value>,
    },
    /// Advance the clock and expire idle sessions
    Expire { after_secs: u64 },
}

/// What one step produced.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    Submitted {
        conflict: Option<Conflict>,
        auto_resolution: Option<Resolution>,
    },
    Closed {
        had_session: bool,
    },
    Resolved {
        resolution: Resolution,
    },
    Expired {
        sessions_closed: usize,
    },
}

#[derive(Debug, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub outcome: StepOutcome,
}

/// Full result of a replay: per-step outcomes plus the engine's final state.
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub steps: Vec<StepReport>,
    pub open_conflicts: Vec<Conflict>,
    pub statistics: Statistics,
    pub audit: Vec<AuditEntry>,
}

impl ScenarioReport {
    /// Conflicts that ended without a resolution, counted over the whole
    /// audit trail rather than the statistics window.
    #[must_use]
    pub fn discarded_count(&self) -> usize {
        self.audit
            .iter()
            .filter(|entry| matches!(entry.outcome, AuditOutcome::Discarded { .. }))
            .count()
    }

    /// Conflicts that were resolved and committed, over the whole trail.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.audit
            .iter()
            .filter(|entry| matches!(entry.outcome, AuditOutcome::Resolved { .. }))
            .count()
    }
}

fn user_ref(id: &str, name: Option<&str>) -> UserRef {
    UserRef::new(id, name.unwrap_or(id))
}

/// Replay a scenario against a fresh engine and in-memory store.
pub async fn run(scenario: &Scenario, config: EngineConfig) -> Result<ScenarioReport, CliError> {
    let store = Arc::new(MemoryFieldStore::new());
    for seed in &scenario.seed {
        store.seed(
            FieldKey::new(&seed.table, &seed.record, &seed.field),
            seed.value.clone(),
        );
    }
    let engine = ConflictEngine::new(config, store)?;

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let outcome = apply_step(&engine, step).await?;
        steps.push(StepReport {
            step: index + 1,
            outcome,
        });
    }

    Ok(ScenarioReport {
        steps,
        open_conflicts: engine.list_conflicts(&ConflictFilter::default()).await,
        statistics: engine.statistics(Duration::hours(1)).await,
        audit: engine.audit_entries().await,
    })
}

async fn apply_step(engine: &ConflictEngine, step: &Step) -> Result<StepOutcome, CliError> {
    match step {
        Step::Submit {
            user,
            name,
            table,
            record,
            field,
            value,
        } => {
            let outcome = engine
                .submit_edit(
                    &user_ref(user, name.as_deref()),
                    table,
                    record,
                    field,
                    value.clone(),
                )
                .await?;
            Ok(StepOutcome::Submitted {
                conflict: outcome.conflict,
                auto_resolution: outcome.auto_resolution,
            })
        }
        Step::Close {
            user,
            table,
            record,
        } => {
            let had_session = engine.close_session(user, table, record).await;
            Ok(StepOutcome::Closed { had_session })
        }
        Step::Resolve {
            user,
            name,
            table,
            record,
            field,
            strategy,
            value,
        } => {
            let strategy: ResolutionStrategy = strategy
                .parse()
                .map_err(|_| CliError::UnknownStrategy(strategy.clone()))?;
            let conflict = find_pending(engine, table, record, field)
                .await
                .ok_or_else(|| {
                    CliError::NoPendingConflict(format!("{table}/{record}.{field}"))
                })?;
            let resolution = engine
                .resolve_manually(
                    conflict.id,
                    strategy,
                    value.clone(),
                    &user_ref(user, name.as_deref()),
                )
                .await?;
            Ok(StepOutcome::Resolved { resolution })
        }
        Step::Expire { after_secs } => {
            let now = Utc::now() + Duration::seconds(i64::try_from(*after_secs).unwrap_or(i64::MAX));
            let sessions_closed = engine.expire_stale(now).await;
            Ok(StepOutcome::Expired { sessions_closed })
        }
    }
}

async fn find_pending(
    engine: &ConflictEngine,
    table: &str,
    record: &str,
    field: &str,
) -> Option<Conflict> {
    engine
        .list_conflicts(&ConflictFilter {
            table: Some(table.to_string()),
            record_id: Some(record.to_string()),
            state: Some(ConflictState::PendingManual),
        })
        .await
        .into_iter()
        .find(|conflict| conflict.key.field == field)
}

/// Render a step report for terminal output.
pub fn describe(report: &StepReport) -> String {
    match &report.outcome {
        StepOutcome::Submitted {
            conflict,
            auto_resolution,
        } => match (conflict, auto_resolution) {
            (Some(conflict), _) => format!(
                "step {}: conflict {} on {} ({} intents, severity {}, {})",
                report.step,
                conflict.id,
                conflict.key,
                conflict.intents.len(),
                conflict.severity,
                conflict.state,
            ),
            (None, Some(resolution)) => format!(
                "step {}: auto-resolved via {} -> {}",
                report.step, resolution.strategy, resolution.resolved_value,
            ),
            (None, None) => format!("step {}: edit accepted, no conflict", report.step),
        },
        StepOutcome::Closed { had_session } => {
            if *had_session {
                format!("step {}: session closed", report.step)
            } else {
                format!("step {}: no session to close", report.step)
            }
        }
        StepOutcome::Resolved { resolution } => format!(
            "step {}: resolved via {} -> {}",
            report.step, resolution.strategy, resolution.resolved_value,
        ),
        StepOutcome::Expired { sessions_closed } => {
            format!("step {}: {sessions_closed} session(s) expired", report.step)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scenario_json() -> Value {
        json!({
            "seed": [
                {"table": "products", "record": "42", "field": "notes", "value": "ok"}
            ],
            "steps": [
                {"action": "submit", "user": "alice", "table": "products",
                 "record": "42", "field": "notes", "value": "low stock"},
                {"action": "submit", "user": "bob", "table": "products",
                 "record": "42", "field": "notes", "value": "low stock, reorder"},
                {"action": "expire", "after_secs": 120}
            ]
        })
    }

    #[test]
    fn test_scenario_deserializes() {
        let scenario: Scenario = serde_json::from_value(scenario_json()).unwrap();
        assert_eq!(scenario.seed.len(), 1);
        assert_eq!(scenario.steps.len(), 3);
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let result: Result<Scenario, _> = serde_json::from_value(json!({
            "steps": [{"action": "frobnicate"}]
        }));
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_report_counts_discards_from_audit_outcomes() {
        let scenario: Scenario = serde_json::from_value(json!({
            "steps": [
                {"action": "submit", "user": "alice", "table": "products",
                 "record": "42", "field": "notes", "value": "red"},
                {"action": "submit", "user": "bob", "table": "products",
                 "record": "42", "field": "notes", "value": "blue"},
                {"action": "close", "user": "bob", "table": "products",
                 "record": "42"}
            ]
        }))
        .unwrap();
        let config = EngineConfig {
            auto_resolve: false,
            ..EngineConfig::default()
        };
        let report = run(&scenario, config).await.unwrap();

        assert_eq!(report.discarded_count(), 1);
        assert_eq!(report.resolved_count(), 0);
        assert!(report.open_conflicts.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_replay_reports_auto_resolution() {
        let scenario: Scenario = serde_json::from_value(scenario_json()).unwrap();
        let report = run(&scenario, EngineConfig::default()).await.unwrap();

        assert_eq!(report.steps.len(), 3);
        assert!(matches!(
            report.steps[1].outcome,
            StepOutcome::Submitted {
                auto_resolution: Some(_),
                ..
            }
        ));
        assert!(report.open_conflicts.is_empty());
        assert_eq!(report.statistics.resolved_count, 1);
    }
}
