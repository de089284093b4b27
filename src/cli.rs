//! Command handler functions for the depgate CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout. `cmd_publish` additionally returns the
//! verdict so the binary can surface it as the process exit code.

use std::fmt::Write;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::model::{Verdict, Warning};
use crate::submit::{self, SubmissionReport};
use crate::threadfix::FindingTracker;
use crate::thresholds::Thresholds;
use crate::{aggregate, db, parser, scan};

/// Everything `cmd_publish` needs besides the database connection.
pub struct PublishOptions<'a> {
    /// Report file, or a workspace directory to scan with `pattern`.
    pub input: &'a Path,
    /// Glob pattern for report files when `input` is a directory.
    pub pattern: &'a str,
    /// Name to record this build under.
    pub build_name: &'a str,
    pub thresholds: Thresholds,
    pub use_delta_values: bool,
    pub use_stable_reference: bool,
    /// When set, every warning is pushed to the tracker after the result is
    /// recorded. Submission failures never change the verdict.
    pub tracker: Option<(&'a dyn FindingTracker, &'a str)>,
    pub cancel: &'a AtomicBool,
}

/// The full pipeline: collect → parse → resolve reference → aggregate →
/// persist → (optionally) submit.
pub fn cmd_publish(conn: &mut Connection, opts: &PublishOptions<'_>) -> Result<(String, Verdict)> {
    let mut out = String::new();

    let warnings = collect_warnings(opts.input, opts.pattern, &mut out)?;

    let reference = db::resolve_reference(conn, opts.use_stable_reference)?;
    let (reference_id, reference_warnings) = match reference {
        Some((id, warnings)) => (Some(id), warnings),
        None => (None, Vec::new()),
    };

    let result = aggregate::aggregate(
        opts.build_name,
        warnings,
        &reference_warnings,
        reference_id,
        &opts.thresholds,
        opts.use_delta_values,
    );

    db::insert_build(conn, &result)?;

    writeln!(
        out,
        "Build '{}': {} warnings ({} high, {} normal, {} low), {} new, {} fixed",
        result.build_name,
        result.total_count(),
        result.totals.high,
        result.totals.normal,
        result.totals.low,
        result.new_count(),
        result.fixed_count,
    )
    .unwrap();
    match reference_id {
        Some(id) => writeln!(out, "Reference build: id {}", id).unwrap(),
        None => writeln!(out, "Reference build: none (all warnings treated as new)").unwrap(),
    }
    writeln!(out, "Verdict: {}", result.verdict).unwrap();

    if let Some((tracker, app_id)) = opts.tracker {
        let all: Vec<Warning> = result.warnings.iter().map(|rw| rw.warning.clone()).collect();
        let report = submit::submit_all(tracker, app_id, &all, opts.cancel);
        render_submission_report(&report, &mut out);
    }

    Ok((out, result.verdict))
}

fn collect_warnings(input: &Path, pattern: &str, out: &mut String) -> Result<Vec<Warning>> {
    let files = if input.is_dir() {
        scan::find_reports(input, pattern)?
    } else {
        vec![input.to_path_buf()]
    };

    if files.is_empty() {
        // An absent report is a valid zero-finding build, not an error.
        writeln!(out, "No report files matching '{}' under {}", pattern, input.display()).unwrap();
        return Ok(Vec::new());
    }

    let mut warnings = Vec::new();
    for file in &files {
        let mut parsed = parser::parse_report_file(file)
            .with_context(|| format!("Failed to parse report {}", file.display()))?;
        writeln!(out, "Parsed {}: {} findings", file.display(), parsed.len()).unwrap();
        warnings.append(&mut parsed);
    }
    Ok(warnings)
}

fn render_submission_report(report: &SubmissionReport, out: &mut String) {
    for outcome in &report.outcomes {
        if let Some(error) = &outcome.error {
            writeln!(out, "Failed to submit {}: {}", outcome.identity, error).unwrap();
        }
    }
    writeln!(out, "{}", report.summary()).unwrap();
}

/// Administrative connectivity probe. Always returns one outcome line;
/// an unreachable tracker is a diagnostic, never a crate error.
pub fn cmd_check_connection(tracker: &dyn FindingTracker) -> String {
    match tracker.check_connection() {
        Ok(()) => "ThreadFix connection successful\n".to_string(),
        Err(e) => format!("Unable to connect to ThreadFix: {}\n", e),
    }
}

/// Re-push a stored build's warning set to the tracker.
pub fn cmd_submit(
    conn: &Connection,
    build_name: &str,
    tracker: &dyn FindingTracker,
    app_id: &str,
    cancel: &AtomicBool,
) -> Result<String> {
    let build_id = db::find_build_id(conn, build_name)?;
    let warnings: Vec<Warning> = db::load_warnings(conn, build_id, false)?
        .into_iter()
        .map(|rw| rw.warning)
        .collect();

    let mut out = String::new();
    let report = submit::submit_all(tracker, app_id, &warnings, cancel);
    render_submission_report(&report, &mut out);
    Ok(out)
}

pub fn cmd_builds(conn: &Connection, json: bool) -> Result<String> {
    let builds = db::list_builds(conn)?;

    if json {
        let mut out = serde_json::to_string_pretty(&builds)?;
        out.push('\n');
        return Ok(out);
    }

    if builds.is_empty() {
        return Ok("No builds in database.\n".to_string());
    }

    let mut out = String::new();
    writeln!(
        out,
        "{:<25} {:<10} {:>6} {:>6} {:>6}  CREATED",
        "NAME", "VERDICT", "TOTAL", "NEW", "FIXED"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(80)).unwrap();
    for b in &builds {
        writeln!(
            out,
            "{:<25} {:<10} {:>6} {:>6} {:>6}  {}",
            b.name, b.verdict, b.total_count, b.new_count, b.fixed_count, b.created_at
        )
        .unwrap();
    }
    Ok(out)
}

pub fn cmd_warnings(conn: &Connection, build_name: &str, new_only: bool, json: bool) -> Result<String> {
    let build_id = db::find_build_id(conn, build_name)?;
    let warnings = db::load_warnings(conn, build_id, new_only)?;

    if json {
        let plain: Vec<&Warning> = warnings.iter().map(|rw| &rw.warning).collect();
        let mut out = serde_json::to_string_pretty(&plain)?;
        out.push('\n');
        return Ok(out);
    }

    if warnings.is_empty() {
        return Ok(format!("No warnings recorded for build '{}'\n", build_name));
    }

    let mut out = String::new();
    for rw in &warnings {
        let marker = if rw.is_new { "NEW " } else { "    " };
        writeln!(
            out,
            "{}{:<8} {:<45} {}",
            marker,
            rw.warning.severity,
            rw.warning.identity,
            rw.warning.file_path
        )
        .unwrap();
    }
    writeln!(out, "({} warnings)", warnings.len()).unwrap();
    Ok(out)
}

pub fn cmd_delete(conn: &mut Connection, name: &str) -> Result<String> {
    db::delete_build(conn, name)?;
    Ok(format!("Deleted build '{}'\n", name))
}
