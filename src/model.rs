//! Uniform in-memory representation of Dependency-Check findings and the
//! build result computed from them. The parser produces `Warning`s which are
//! aggregated into a `BuildResult` and inserted into the SQLite store.

use crate::error::DepgateError;

/// Severity of a single finding, ordered from least to most severe.
///
/// Dependency-Check reports use Low/Medium/High; "Medium" (and the older
/// "Moderate") map to `Normal` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Low,
    Normal,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Normal => "Normal",
            Severity::High => "High",
        }
    }

    /// Map a raw severity string from a report to our enum. Unknown values
    /// fall back to `Low` rather than failing the whole report.
    #[must_use]
    pub fn from_report(raw: &str) -> Severity {
        match raw.trim().to_lowercase().as_str() {
            "high" | "critical" => Severity::High,
            "normal" | "medium" | "moderate" => Severity::Normal,
            _ => Severity::Low,
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = DepgateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "normal" => Ok(Severity::Normal),
            "high" => Ok(Severity::High),
            _ => Err(DepgateError::Parse(format!(
                "Unknown severity: '{}'. Expected: low, normal, high",
                s
            ))),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for Severity {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A single dependency vulnerability finding.
///
/// Created once by the report parser and read-only afterwards. `identity` is
/// the stable key used to decide "new" vs. "existing" across builds
/// (dependency file name plus CVE id).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Warning {
    /// Stable identity key, e.g. `commons-collections-3.2.1.jar:CVE-2015-6420`.
    pub identity: String,
    /// Human-readable description of the vulnerability.
    pub message: String,
    pub severity: Severity,
    /// Path of the affected dependency inside the scanned workspace.
    pub file_path: String,
}

/// Warning counts broken down by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeverityCounts {
    pub high: u64,
    pub normal: u64,
    pub low: u64,
}

impl SeverityCounts {
    /// Tally a set of warnings.
    #[must_use]
    pub fn count(warnings: &[Warning]) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for w in warnings {
            match w.severity {
                Severity::High => counts.high += 1,
                Severity::Normal => counts.normal += 1,
                Severity::Low => counts.low += 1,
            }
        }
        counts
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.high + self.normal + self.low
    }

    /// Per-severity count delta against a reference, saturating at zero.
    #[must_use]
    pub fn delta(&self, reference: &SeverityCounts) -> SeverityCounts {
        SeverityCounts {
            high: self.high.saturating_sub(reference.high),
            normal: self.normal.saturating_sub(reference.normal),
            low: self.low.saturating_sub(reference.low),
        }
    }
}

/// The tri-state build quality outcome. Ordering: `Failed > Unstable > Stable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verdict {
    Stable,
    Unstable,
    Failed,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Stable => "stable",
            Verdict::Unstable => "unstable",
            Verdict::Failed => "failed",
        }
    }

    /// Combine two verdicts, keeping the worse one.
    #[must_use]
    pub fn worse_of(self, other: Verdict) -> Verdict {
        self.max(other)
    }

    /// Process exit code for the CLI verdict surface.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Stable => 0,
            Verdict::Unstable => 1,
            Verdict::Failed => 2,
        }
    }
}

impl std::str::FromStr for Verdict {
    type Err = DepgateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stable" => Ok(Verdict::Stable),
            "unstable" => Ok(Verdict::Unstable),
            "failed" => Ok(Verdict::Failed),
            _ => Err(DepgateError::Parse(format!("Unknown verdict: '{}'", s))),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One warning inside a build result, flagged as new when its identity was
/// absent from the reference build.
#[derive(Debug, Clone)]
pub struct ResultWarning {
    pub warning: Warning,
    pub is_new: bool,
}

/// Immutable result of evaluating one build's warning set.
///
/// Constructed exactly once per build by the aggregator, never mutated, and
/// persisted to the store for later reference resolution and trend listing.
#[derive(Debug)]
pub struct BuildResult {
    pub build_name: String,
    /// Id of the reference build used for delta computation, if one resolved.
    pub reference_id: Option<i64>,
    /// Absolute counts over the current warning set.
    pub totals: SeverityCounts,
    /// New-scope counts as fed into the threshold evaluator (identity-based
    /// or raw deltas, depending on the delta-values switch).
    pub new_counts: SeverityCounts,
    /// Warnings present in the reference but absent from the current set.
    pub fixed_count: u64,
    pub verdict: Verdict,
    /// The current warning set in report order, with new-flags.
    pub warnings: Vec<ResultWarning>,
}

impl BuildResult {
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.totals.total()
    }

    #[must_use]
    pub fn new_count(&self) -> u64 {
        self.new_counts.total()
    }
}

/// Metadata row for a stored build.
#[derive(Debug, serde::Serialize)]
pub struct BuildInfo {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub verdict: String,
    pub total_count: u64,
    pub new_count: u64,
    pub fixed_count: u64,
}
