//! Combines the current build's warning set with a reference build's prior
//! set to compute new/fixed deltas, runs the threshold evaluation, and
//! materializes the immutable [`BuildResult`].

use std::collections::HashSet;

use crate::model::{BuildResult, ResultWarning, SeverityCounts, Warning};
use crate::thresholds::{self, Thresholds};

/// Aggregate one build's warnings against a reference set.
///
/// A warning is "new" when its identity key is absent from the reference
/// set; "fixed" is the symmetric complement (in the reference, gone from the
/// current set). A missing reference build is represented by an empty
/// `reference` slice and is not an error.
///
/// When `use_delta_values` is set, the new-scope counts fed into the
/// threshold evaluator are the raw per-severity count deltas
/// (current − reference, saturating at zero) rather than the identity-based
/// new set's counts. Total-scope counts are always the absolute totals.
pub fn aggregate(
    build_name: &str,
    current: Vec<Warning>,
    reference: &[Warning],
    reference_id: Option<i64>,
    thresholds: &Thresholds,
    use_delta_values: bool,
) -> BuildResult {
    let reference_identities: HashSet<&str> =
        reference.iter().map(|w| w.identity.as_str()).collect();
    let current_identities: HashSet<&str> = current.iter().map(|w| w.identity.as_str()).collect();

    let fixed_count = reference
        .iter()
        .filter(|w| !current_identities.contains(w.identity.as_str()))
        .count() as u64;

    // Preserve report order; the submission loop and the store rely on it.
    let warnings: Vec<ResultWarning> = current
        .into_iter()
        .map(|warning| {
            let is_new = !reference_identities.contains(warning.identity.as_str());
            ResultWarning { warning, is_new }
        })
        .collect();

    let all: Vec<Warning> = warnings.iter().map(|rw| rw.warning.clone()).collect();
    let new_only: Vec<Warning> = warnings
        .iter()
        .filter(|rw| rw.is_new)
        .map(|rw| rw.warning.clone())
        .collect();

    let totals = SeverityCounts::count(&all);
    let new_counts = if use_delta_values {
        totals.delta(&SeverityCounts::count(reference))
    } else {
        SeverityCounts::count(&new_only)
    };

    let verdict = thresholds::evaluate(&totals, &new_counts, thresholds);

    BuildResult {
        build_name: build_name.to_string(),
        reference_id,
        totals,
        new_counts,
        fixed_count,
        verdict,
        warnings,
    }
}
