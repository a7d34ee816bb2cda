//! Conflict detection over the open-intents index.
//!
//! Runs on every submit and every session close, always under the owning
//! record's slot lock. Produces a decision for the engine to apply; it never
//! mutates shared state itself.

use chrono::{DateTime, Utc};

use crate::models::{Conflict, EditIntent, FieldKey, Severity};

/// Outcome of re-evaluating one field's open intents.
#[derive(Debug)]
pub(crate) enum Detection {
    /// Nothing to do: no divergence and no open conflict
    None,
    /// A new conflict over the given intents
    Created(Conflict),
    /// An existing open conflict, refreshed with the current intent set
    Updated(Conflict),
    /// The open conflict lost divergence and must be dissolved
    Dissolved(Conflict),
}

/// Compare the current open intents for a field against an existing open
/// conflict, if any.
///
/// A conflict requires at least two distinct proposed values from different
/// sessions; convergent edits (same proposed value, any original) never
/// conflict. The returned conflict's intents are the full open set for the
/// field, ordered by (timestamp, session id) for determinism. Severity on a
/// `Created` conflict is a placeholder; the engine classifies before acting.
pub(crate) fn detect(
    open_intents: &[EditIntent],
    existing: Option<&Conflict>,
    key: &FieldKey,
    now: DateTime<Utc>,
) -> Detection {
    let divergent = distinct_proposed_count(open_intents) >= 2;

    match (divergent, existing) {
        (false, None) => Detection::None,
        (false, Some(conflict)) => Detection::Dissolved(conflict.clone()),
        (true, None) => Detection::Created(Conflict::new(
            key.clone(),
            open_intents.to_vec(),
            Severity::Low,
            now,
        )),
        (true, Some(conflict)) => {
            let mut refreshed = conflict.clone();
            refreshed.replace_intents(open_intents.to_vec());
            Detection::Updated(refreshed)
        }
    }
}

fn distinct_proposed_count(intents: &[EditIntent]) -> usize {
    let mut seen: Vec<&serde_json::Value> = Vec::new();
    for intent in intents {
        if !seen.contains(&&intent.proposed_value) {
            seen.push(&intent.proposed_value);
        }
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SessionId, UserRef};
    use chrono::Duration;
    use serde_json::{json, Value};

    fn key() -> FieldKey {
        FieldKey::new("products", "42", "price")
    }

    fn intent(user: &str, original: Value, proposed: Value, at: DateTime<Utc>) -> EditIntent {
        EditIntent::new(
            key(),
            SessionId::new(),
            UserRef::new(user, user),
            original,
            proposed,
            at,
        )
    }

    #[test]
    fn test_single_intent_never_conflicts() {
        let now = Utc::now();
        let open = vec![intent("a", json!(10.0), json!(12.0), now)];
        assert!(matches!(detect(&open, None, &key(), now), Detection::None));
    }

    #[test]
    fn test_convergent_edits_are_not_conflicts() {
        let now = Utc::now();
        // Same proposed value, even from different originals.
        let open = vec![
            intent("a", json!(10.0), json!(12.0), now),
            intent("b", json!(9.0), json!(12.0), now + Duration::seconds(1)),
        ];
        assert!(matches!(detect(&open, None, &key(), now), Detection::None));
    }

    #[test]
    fn test_divergent_intents_create_conflict() {
        let now = Utc::now();
        let open = vec![
            intent("a", json!(10.0), json!(12.0), now),
            intent("b", json!(10.0), json!(11.5), now + Duration::seconds(1)),
        ];

        match detect(&open, None, &key(), now) {
            Detection::Created(conflict) => {
                assert_eq!(conflict.intents.len(), 2);
                assert_eq!(conflict.intents[0].user.id, "a");
                assert_eq!(conflict.intents[1].user.id, "b");
            }
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[test]
    fn test_existing_conflict_is_updated_not_duplicated() {
        let now = Utc::now();
        let open = vec![
            intent("a", json!(10.0), json!(12.0), now),
            intent("b", json!(10.0), json!(11.5), now + Duration::seconds(1)),
        ];
        let Detection::Created(first) = detect(&open, None, &key(), now) else {
            panic!("expected Created");
        };

        let mut wider = open.clone();
        wider.push(intent("c", json!(10.0), json!(13.0), now + Duration::seconds(2)));

        match detect(&wider, Some(&first), &key(), now) {
            Detection::Updated(updated) => {
                assert_eq!(updated.id, first.id);
                assert_eq!(updated.detected_at, first.detected_at);
                assert_eq!(updated.intents.len(), 3);
            }
            other => panic!("expected Updated, got {other:?}"),
        }
    }

    #[test]
    fn test_conflict_dissolves_when_divergence_lost() {
        let now = Utc::now();
        let open = vec![
            intent("a", json!(10.0), json!(12.0), now),
            intent("b", json!(10.0), json!(11.5), now + Duration::seconds(1)),
        ];
        let Detection::Created(conflict) = detect(&open, None, &key(), now) else {
            panic!("expected Created");
        };

        // Only one intent left after the other session closed.
        let remaining = vec![open[0].clone()];
        assert!(matches!(
            detect(&remaining, Some(&conflict), &key(), now),
            Detection::Dissolved(_)
        ));

        // Or two intents that now agree.
        let converged = vec![
            open[0].clone(),
            intent("b", json!(10.0), json!(12.0), now + Duration::seconds(2)),
        ];
        assert!(matches!(
            detect(&converged, Some(&conflict), &key(), now),
            Detection::Dissolved(_)
        ));
    }
}
