//! Resolution policy.
//!
//! Pure decision logic for the resolution engine: given a conflict, produce
//! the `Resolution` that should be applied. State transitions and the
//! persistence write live in the engine facade, which owns the shared state.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::models::{
    Conflict, Resolution, ResolutionStrategy, ResolvedBy, Severity, UserRef,
};

pub(crate) const REASON_OTHER_WINS: &str = "newer value preferred for low-impact field";
pub(crate) const REASON_MERGE: &str = "values merged pending review";

/// Auto-resolution policy for low/medium severity conflicts.
///
/// Returns `None` for severities that must wait for a human decision. The
/// caller is responsible for checking the global auto-resolve setting.
pub(crate) fn auto_resolution(conflict: &Conflict, now: DateTime<Utc>) -> Option<Resolution> {
    match conflict.severity {
        Severity::Low => {
            let newest = conflict.newest_intent()?;
            Some(Resolution::new(
                ResolutionStrategy::OtherWins,
                newest.proposed_value.clone(),
                REASON_OTHER_WINS,
                ResolvedBy::System,
                now,
            ))
        }
        Severity::Medium => Some(Resolution::new(
            ResolutionStrategy::Merge,
            merge_values(conflict),
            REASON_MERGE,
            ResolvedBy::System,
            now,
        )),
        Severity::High | Severity::Critical => None,
    }
}

/// Build the resolution for a manual decision.
///
/// Validates the strategy against the conflict's contents: `user_wins` needs
/// an open intent from the requesting user, `other_wins` needs one from
/// somebody else, and `manual` needs an explicit value.
pub(crate) fn manual_resolution(
    conflict: &Conflict,
    strategy: ResolutionStrategy,
    resolved_value: Option<Value>,
    user: &UserRef,
    now: DateTime<Utc>,
) -> Result<Resolution> {
    let resolved_by = ResolvedBy::User(user.id.clone());

    let (value, reasoning) = match strategy {
        ResolutionStrategy::Merge => (
            merge_values(conflict),
            format!("values merged by {}", user.name),
        ),
        ResolutionStrategy::UserWins => {
            let own = conflict.intent_for_user(&user.id).ok_or_else(|| {
                Error::InvalidStrategy(format!(
                    "user_wins requires an open intent from user {} on {}",
                    user.id, conflict.key
                ))
            })?;
            (
                own.proposed_value.clone(),
                format!("{}'s value kept", user.name),
            )
        }
        ResolutionStrategy::OtherWins => {
            let other = conflict.newest_intent_not_from(&user.id).ok_or_else(|| {
                Error::InvalidStrategy(format!(
                    "other_wins requires an open intent from another user on {}",
                    conflict.key
                ))
            })?;
            (
                other.proposed_value.clone(),
                format!("{}'s value kept", other.user.name),
            )
        }
        ResolutionStrategy::Manual => {
            let value = resolved_value.ok_or_else(|| {
                Error::InvalidStrategy(
                    "manual strategy requires an explicit resolved value".to_string(),
                )
            })?;
            (value, format!("custom value supplied by {}", user.name))
        }
    };

    Ok(Resolution::new(strategy, value, reasoning, resolved_by, now))
}

/// Combine all distinct proposed values into one.
///
/// Text values merge textually: if one value already contains every other it
/// stands alone, otherwise the distinct values are joined. Non-text values
/// are never concatenated; they become a composite flagged for the next
/// editor's review.
pub(crate) fn merge_values(conflict: &Conflict) -> Value {
    let distinct = conflict.distinct_proposed();

    let texts: Option<Vec<&str>> = distinct.iter().map(|value| value.as_str()).collect();
    if let Some(texts) = texts {
        if let Some(superset) = texts
            .iter()
            .find(|candidate| texts.iter().all(|text| candidate.contains(text)))
        {
            return Value::String((*superset).to_string());
        }
        return Value::String(texts.join("; "));
    }

    json!({
        "needs_review": true,
        "candidates": distinct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EditIntent, FieldKey, SessionId};
    use chrono::Duration;

    fn conflict_with(severity: Severity, pairs: &[(&str, Value)]) -> Conflict {
        let now = Utc::now();
        let intents = pairs
            .iter()
            .enumerate()
            .map(|(index, (user, proposed))| {
                EditIntent::new(
                    FieldKey::new("products", "42", "notes"),
                    SessionId::new(),
                    UserRef::new(*user, *user),
                    json!("base"),
                    proposed.clone(),
                    now + Duration::milliseconds(i64::try_from(index).unwrap_or(0)),
                )
            })
            .collect();
        Conflict::new(
            FieldKey::new("products", "42", "notes"),
            intents,
            severity,
            now,
        )
    }

    #[test]
    fn test_low_severity_auto_resolves_other_wins() {
        let conflict = conflict_with(
            Severity::Low,
            &[("a", json!("draft")), ("b", json!("Draft "))],
        );
        let resolution = auto_resolution(&conflict, Utc::now()).unwrap();

        assert_eq!(resolution.strategy, ResolutionStrategy::OtherWins);
        assert_eq!(resolution.resolved_value, json!("Draft "));
        assert_eq!(resolution.reasoning, REASON_OTHER_WINS);
        assert_eq!(resolution.resolved_by, ResolvedBy::System);
    }

    #[test]
    fn test_medium_severity_auto_resolves_merge() {
        let conflict = conflict_with(
            Severity::Medium,
            &[("a", json!("low stock")), ("b", json!("low stock, reorder soon"))],
        );
        let resolution = auto_resolution(&conflict, Utc::now()).unwrap();

        assert_eq!(resolution.strategy, ResolutionStrategy::Merge);
        let merged = resolution.resolved_value.as_str().unwrap();
        assert!(merged.contains("low stock"));
        assert!(merged.contains("reorder soon"));
        assert_eq!(resolution.reasoning, REASON_MERGE);
    }

    #[test]
    fn test_high_and_critical_never_auto_resolve() {
        for severity in [Severity::High, Severity::Critical] {
            let conflict =
                conflict_with(severity, &[("a", json!("x")), ("b", json!("y"))]);
            assert!(auto_resolution(&conflict, Utc::now()).is_none());
        }
    }

    #[test]
    fn test_merge_unrelated_text_joins_both() {
        let conflict = conflict_with(
            Severity::Medium,
            &[("a", json!("red")), ("b", json!("blue"))],
        );
        assert_eq!(merge_values(&conflict), json!("red; blue"));
    }

    #[test]
    fn test_merge_non_text_flags_for_review() {
        let conflict = conflict_with(Severity::Medium, &[("a", json!(10)), ("b", json!(12))]);
        let merged = merge_values(&conflict);

        assert_eq!(merged["needs_review"], json!(true));
        assert_eq!(merged["candidates"], json!([10, 12]));
    }

    #[test]
    fn test_manual_user_wins_requires_own_intent() {
        let conflict = conflict_with(Severity::High, &[("a", json!("x")), ("b", json!("y"))]);

        let ok = manual_resolution(
            &conflict,
            ResolutionStrategy::UserWins,
            None,
            &UserRef::new("a", "a"),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(ok.resolved_value, json!("x"));
        assert_eq!(ok.resolved_by, ResolvedBy::User("a".to_string()));

        let missing = manual_resolution(
            &conflict,
            ResolutionStrategy::UserWins,
            None,
            &UserRef::new("stranger", "Stranger"),
            Utc::now(),
        );
        assert!(matches!(missing, Err(Error::InvalidStrategy(_))));
    }

    #[test]
    fn test_manual_other_wins_takes_newest_other_value() {
        let conflict = conflict_with(
            Severity::High,
            &[("a", json!("x")), ("b", json!("y")), ("c", json!("z"))],
        );
        let resolution = manual_resolution(
            &conflict,
            ResolutionStrategy::OtherWins,
            None,
            &UserRef::new("c", "c"),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(resolution.resolved_value, json!("y"));
    }

    #[test]
    fn test_manual_strategy_requires_value() {
        let conflict = conflict_with(Severity::High, &[("a", json!("x")), ("b", json!("y"))]);

        let missing = manual_resolution(
            &conflict,
            ResolutionStrategy::Manual,
            None,
            &UserRef::new("a", "a"),
            Utc::now(),
        );
        assert!(matches!(missing, Err(Error::InvalidStrategy(_))));

        let ok = manual_resolution(
            &conflict,
            ResolutionStrategy::Manual,
            Some(json!("hand-merged")),
            &UserRef::new("a", "a"),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(ok.resolved_value, json!("hand-merged"));
    }
}
