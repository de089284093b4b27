//! The per-build submission loop: push every warning in a build result to
//! the tracker, isolating failures per item.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::model::Warning;
use crate::threadfix::{FindingTracker, TrackerError};

/// Outcome of submitting one warning.
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub identity: String,
    /// `None` on success.
    pub error: Option<TrackerError>,
}

impl SubmissionOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// The batch of per-warning outcomes for one build.
#[derive(Debug, Default)]
pub struct SubmissionReport {
    /// One outcome per attempted warning, in submission order.
    pub outcomes: Vec<SubmissionOutcome>,
    /// True when the loop stopped early because cancellation was observed.
    pub cancelled: bool,
}

impl SubmissionReport {
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.submitted()
    }

    /// One-line summary for the build log.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Submitted {} of {} findings to ThreadFix ({} failed)",
            self.submitted(),
            self.outcomes.len(),
            self.failed()
        );
        if self.cancelled {
            line.push_str(" [cancelled]");
        }
        line
    }
}

/// Submit every warning, in order, recording one outcome per warning.
///
/// A single warning's failure never stops the remaining submissions, and
/// the loop itself never fails: partial failure is reported through the
/// outcome batch and the caller decides how loudly to surface it. The
/// cancellation flag is observed between iterations; once set, no further
/// submission is started.
pub fn submit_all(
    tracker: &dyn FindingTracker,
    app_id: &str,
    warnings: &[Warning],
    cancel: &AtomicBool,
) -> SubmissionReport {
    let mut report = SubmissionReport::default();

    for warning in warnings {
        if cancel.load(Ordering::Relaxed) {
            report.cancelled = true;
            break;
        }
        let error = tracker.submit_finding(app_id, warning).err();
        report.outcomes.push(SubmissionOutcome {
            identity: warning.identity.clone(),
            error,
        });
    }

    report
}
