//! Severity classification policy.
//!
//! `classify` is a pure function of the conflict's ordered intent list, the
//! field tier table, and the numeric divergence threshold. Tests rely on
//! that purity: same inputs, same severity, every call.
//!
//! Fixed mapping:
//! - `critical`: high-tier field with divergent original values (stale base)
//! - `high`: high-tier field, stale base on a lower tier, or numeric
//!   divergence above the threshold
//! - `low`: low-tier field whose values are trivially reconcilable or
//!   mergeable text
//! - `medium`: everything else

use serde_json::Value;

use crate::config::{FieldTier, FieldTiers};
use crate::models::{Conflict, Severity};

/// Shape of the divergence between competing proposed values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Divergence {
    /// Values differ only in whitespace or letter case
    Trivial,
    /// Text values where one contains every other (superset/prefix)
    MergeableText,
    /// Numeric values with the given maximum relative difference
    Numeric(f64),
    /// Unrelated text, mixed types, or anything else
    Opaque,
}

/// Assign a severity to a conflict.
#[must_use]
pub fn classify(conflict: &Conflict, tiers: &FieldTiers, divergence_threshold: f64) -> Severity {
    let tier = tiers.tier_of(conflict.key.table(), &conflict.key.field);

    if conflict.stale_base() {
        // One editor started from data already superseded by a committed
        // change; always escalated.
        return if tier == FieldTier::High {
            Severity::Critical
        } else {
            Severity::High
        };
    }

    let values = conflict.distinct_proposed();
    let divergence = divergence_of(&values);

    if let Divergence::Numeric(spread) = divergence {
        if spread > divergence_threshold {
            return Severity::High;
        }
    }
    if tier == FieldTier::High {
        return Severity::High;
    }

    match divergence {
        Divergence::Trivial | Divergence::MergeableText if tier == FieldTier::Low => Severity::Low,
        _ => Severity::Medium,
    }
}

/// Measure how far apart a set of distinct proposed values are.
#[must_use]
pub fn divergence_of(values: &[&Value]) -> Divergence {
    if values.len() < 2 {
        return Divergence::Trivial;
    }

    if let Some(numbers) = all_numbers(values) {
        return Divergence::Numeric(relative_spread(&numbers));
    }

    if let Some(texts) = all_strings(values) {
        if trivially_equal(&texts) {
            return Divergence::Trivial;
        }
        if has_superset(&texts) {
            return Divergence::MergeableText;
        }
    }

    Divergence::Opaque
}

fn all_numbers(values: &[&Value]) -> Option<Vec<f64>> {
    values.iter().map(|value| value.as_f64()).collect()
}

fn all_strings<'a>(values: &[&'a Value]) -> Option<Vec<&'a str>> {
    values.iter().map(|value| value.as_str()).collect()
}

/// Maximum pairwise relative difference, scaled by the largest magnitude.
fn relative_spread(numbers: &[f64]) -> f64 {
    let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
    let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let scale = min.abs().max(max.abs());
    if scale == 0.0 {
        0.0
    } else {
        (max - min) / scale
    }
}

fn trivially_equal(texts: &[&str]) -> bool {
    let normalized = texts[0].trim().to_lowercase();
    texts
        .iter()
        .all(|text| text.trim().to_lowercase() == normalized)
}

/// Whether one value textually contains every other (e.g. a value the others
/// are a prefix of).
fn has_superset(texts: &[&str]) -> bool {
    texts
        .iter()
        .any(|candidate| texts.iter().all(|text| candidate.contains(text)))
}
