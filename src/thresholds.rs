//! Threshold evaluation: comparing warning counts against configured limits
//! to produce a build verdict.
//!
//! Two independent limit sets exist per scope (total / new): one that makes
//! the build unstable and one that fails it. Evaluation is a pure function
//! over the counts; the failed sets are checked first so that "failed"
//! always dominates "unstable" even when a misconfiguration puts a failed
//! limit below the matching unstable limit.

use crate::model::{SeverityCounts, Verdict};

/// Optional ceilings for one (verdict, scope) pair. An unset limit never
/// triggers. The `all` limit compares against the summed count and is
/// checked independently of the per-severity limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdLimits {
    pub all: Option<u64>,
    pub high: Option<u64>,
    pub normal: Option<u64>,
    pub low: Option<u64>,
}

impl ThresholdLimits {
    /// True when any configured limit is strictly exceeded by the counts.
    #[must_use]
    pub fn exceeded_by(&self, counts: &SeverityCounts) -> bool {
        exceeds(self.all, counts.total())
            || exceeds(self.high, counts.high)
            || exceeds(self.normal, counts.normal)
            || exceeds(self.low, counts.low)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_none() && self.high.is_none() && self.normal.is_none() && self.low.is_none()
    }
}

fn exceeds(limit: Option<u64>, count: u64) -> bool {
    match limit {
        Some(limit) => count > limit,
        None => false,
    }
}

/// The full threshold configuration: limits per verdict × scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct Thresholds {
    pub unstable_total: ThresholdLimits,
    pub unstable_new: ThresholdLimits,
    pub failed_total: ThresholdLimits,
    pub failed_new: ThresholdLimits,
}

impl Thresholds {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unstable_total.is_empty()
            && self.unstable_new.is_empty()
            && self.failed_total.is_empty()
            && self.failed_new.is_empty()
    }
}

/// Evaluate total-scope and new-scope counts against the configured limits.
///
/// Deterministic and side-effect free. Each scope is evaluated on its own
/// ladder (failed before unstable, so failed wins even when a
/// misconfiguration puts a failed limit below the unstable one), and the
/// combined result is the worse of the two scopes' verdicts.
#[must_use]
pub fn evaluate(total: &SeverityCounts, new: &SeverityCounts, thresholds: &Thresholds) -> Verdict {
    let total_verdict =
        evaluate_scope(total, &thresholds.failed_total, &thresholds.unstable_total);
    let new_verdict = evaluate_scope(new, &thresholds.failed_new, &thresholds.unstable_new);
    total_verdict.worse_of(new_verdict)
}

fn evaluate_scope(
    counts: &SeverityCounts,
    failed: &ThresholdLimits,
    unstable: &ThresholdLimits,
) -> Verdict {
    if failed.exceeded_by(counts) {
        Verdict::Failed
    } else if unstable.exceeded_by(counts) {
        Verdict::Unstable
    } else {
        Verdict::Stable
    }
}
