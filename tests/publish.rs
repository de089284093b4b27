mod common;

use std::cell::RefCell;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use depgate::cli::{self, PublishOptions};
use depgate::model::{Verdict, Warning};
use depgate::threadfix::{FindingTracker, TrackerError};
use depgate::thresholds::{ThresholdLimits, Thresholds};

const FIXTURE: &str = "tests/fixtures/dependency-check-report.xml";

/// Recording tracker stub for pipeline tests.
#[derive(Default)]
struct RecordingTracker {
    submitted: RefCell<Vec<String>>,
    fail_all: bool,
}

impl FindingTracker for RecordingTracker {
    fn check_connection(&self) -> Result<(), TrackerError> {
        Ok(())
    }

    fn submit_finding(&self, _app_id: &str, warning: &Warning) -> Result<(), TrackerError> {
        self.submitted.borrow_mut().push(warning.identity.clone());
        if self.fail_all {
            Err(TrackerError::Status(503))
        } else {
            Ok(())
        }
    }
}

fn publish(
    conn: &mut rusqlite::Connection,
    input: &Path,
    build_name: &str,
    thresholds: Thresholds,
    use_stable_reference: bool,
    tracker: Option<&dyn FindingTracker>,
) -> (String, Verdict) {
    let cancel = AtomicBool::new(false);
    let opts = PublishOptions {
        input,
        pattern: depgate::scan::DEFAULT_PATTERN,
        build_name,
        thresholds,
        use_delta_values: false,
        use_stable_reference,
        tracker: tracker.map(|t| (t, "42")),
        cancel: &cancel,
    };
    cli::cmd_publish(conn, &opts).unwrap()
}

fn failed_total_high(limit: u64) -> Thresholds {
    Thresholds {
        failed_total: ThresholdLimits {
            high: Some(limit),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn fixture_report_with_three_high_fails_the_two_high_threshold() {
    let (mut conn, _dir, _) = common::setup_db();

    let (out, verdict) = publish(
        &mut conn,
        Path::new(FIXTURE),
        "b1",
        failed_total_high(2),
        false,
        None,
    );

    assert_eq!(verdict, Verdict::Failed);
    assert!(out.contains("5 warnings (3 high, 2 normal, 0 low)"));
    assert!(out.contains("Verdict: failed"));

    let builds = depgate::db::list_builds(&conn).unwrap();
    assert_eq!(builds[0].verdict, "failed");
    assert_eq!(builds[0].total_count, 5);
}

#[test]
fn second_publish_computes_new_and_fixed_against_reference() {
    let (mut conn, dir, _) = common::setup_db();

    publish(&mut conn, Path::new(FIXTURE), "b1", Thresholds::default(), false, None);

    // Same workspace minus xalan, plus a new vulnerable jar.
    let report = dir.path().join("report.xml");
    std::fs::write(
        &report,
        r#"<analysis><dependencies>
            <dependency>
              <fileName>commons-collections-3.2.1.jar</fileName>
              <filePath>/ws/lib/commons-collections-3.2.1.jar</filePath>
              <vulnerabilities>
                <vulnerability><name>CVE-2015-6420</name><severity>High</severity></vulnerability>
              </vulnerabilities>
            </dependency>
            <dependency>
              <fileName>commons-httpclient-3.1.jar</fileName>
              <filePath>/ws/lib/commons-httpclient-3.1.jar</filePath>
              <vulnerabilities>
                <vulnerability><name>CVE-2012-5783</name><severity>Medium</severity></vulnerability>
                <vulnerability><name>CVE-2012-6153</name><severity>Medium</severity></vulnerability>
              </vulnerabilities>
            </dependency>
            <dependency>
              <fileName>shiny-new-0.1.jar</fileName>
              <filePath>/ws/lib/shiny-new-0.1.jar</filePath>
              <vulnerabilities>
                <vulnerability><name>CVE-2016-0001</name><severity>Low</severity></vulnerability>
              </vulnerabilities>
            </dependency>
        </dependencies></analysis>"#,
    )
    .unwrap();

    let (out, verdict) = publish(&mut conn, &report, "b2", Thresholds::default(), false, None);

    // b1 had 5 findings; xalan's two CVEs are fixed, shiny-new's one is new.
    assert_eq!(verdict, Verdict::Stable);
    assert!(out.contains("4 warnings"));
    assert!(out.contains("1 new, 2 fixed"));

    let builds = depgate::db::list_builds(&conn).unwrap();
    assert_eq!(builds[1].new_count, 1);
    assert_eq!(builds[1].fixed_count, 2);
}

#[test]
fn unstable_reference_is_skipped_when_stable_requested() {
    let (mut conn, _dir, _) = common::setup_db();

    // First build fails its threshold; with --use-stable-reference the next
    // build finds no stable reference and treats everything as new.
    publish(&mut conn, Path::new(FIXTURE), "b1", failed_total_high(0), false, None);
    let (out, _) = publish(
        &mut conn,
        Path::new(FIXTURE),
        "b2",
        Thresholds::default(),
        true,
        None,
    );

    assert!(out.contains("Reference build: none"));
    assert!(out.contains("5 new, 0 fixed"));
}

#[test]
fn directory_input_scans_for_reports() {
    let (mut conn, dir, _) = common::setup_db();

    let target = dir.path().join("ws/module/target");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::copy(FIXTURE, target.join("dependency-check-report.xml")).unwrap();

    let (out, _) = publish(
        &mut conn,
        &dir.path().join("ws"),
        "b1",
        Thresholds::default(),
        false,
        None,
    );
    assert!(out.contains("5 findings"));
    assert!(out.contains("5 warnings"));
}

#[test]
fn missing_report_is_a_zero_finding_build() {
    let (mut conn, dir, _) = common::setup_db();
    let empty_ws = dir.path().join("empty");
    std::fs::create_dir_all(&empty_ws).unwrap();

    let (out, verdict) = publish(&mut conn, &empty_ws, "b1", Thresholds::default(), false, None);

    assert_eq!(verdict, Verdict::Stable);
    assert!(out.contains("No report files"));
    assert!(out.contains("0 warnings"));
}

#[test]
fn warnings_are_submitted_in_report_order() {
    let (mut conn, _dir, _) = common::setup_db();
    let tracker = RecordingTracker::default();

    publish(
        &mut conn,
        Path::new(FIXTURE),
        "b1",
        Thresholds::default(),
        false,
        Some(&tracker),
    );

    let submitted = tracker.submitted.borrow();
    assert_eq!(submitted.len(), 5);
    assert_eq!(submitted[0], "commons-collections-3.2.1.jar:CVE-2015-6420");
    assert_eq!(submitted[1], "xalan-2.7.1.jar:CVE-2014-0107");
}

#[test]
fn submission_failures_never_change_the_verdict() {
    let (mut conn, _dir, _) = common::setup_db();
    let tracker = RecordingTracker {
        fail_all: true,
        ..Default::default()
    };

    let (out, verdict) = publish(
        &mut conn,
        Path::new(FIXTURE),
        "b1",
        Thresholds::default(),
        false,
        Some(&tracker),
    );

    // Every submission failed, but the verdict comes from the report alone.
    assert_eq!(verdict, Verdict::Stable);
    assert!(out.contains("Submitted 0 of 5 findings to ThreadFix (5 failed)"));
    assert!(out.contains("Failed to submit commons-collections-3.2.1.jar:CVE-2015-6420"));
    assert_eq!(tracker.submitted.borrow().len(), 5);
}

#[test]
fn check_connection_output_is_one_line_either_way() {
    let tracker = RecordingTracker::default();
    let out = cli::cmd_check_connection(&tracker);
    assert_eq!(out, "ThreadFix connection successful\n");

    struct Down;
    impl FindingTracker for Down {
        fn check_connection(&self) -> Result<(), TrackerError> {
            Err(TrackerError::Status(403))
        }
        fn submit_finding(&self, _: &str, _: &Warning) -> Result<(), TrackerError> {
            unreachable!()
        }
    }
    let out = cli::cmd_check_connection(&Down);
    assert_eq!(out, "Unable to connect to ThreadFix: ThreadFix returned HTTP 403\n");
}

#[test]
fn builds_listing_renders_table_and_json() {
    let (mut conn, _dir, _) = common::setup_db();
    assert_eq!(cli::cmd_builds(&conn, false).unwrap(), "No builds in database.\n");

    publish(&mut conn, Path::new(FIXTURE), "b1", failed_total_high(2), false, None);

    let table = cli::cmd_builds(&conn, false).unwrap();
    assert!(table.contains("b1"));
    assert!(table.contains("failed"));

    let json = cli::cmd_builds(&conn, true).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed[0]["name"], "b1");
    assert_eq!(parsed[0]["total_count"], 5);
}

#[test]
fn warnings_listing_supports_new_only() {
    let (mut conn, dir, _) = common::setup_db();
    publish(&mut conn, Path::new(FIXTURE), "b1", Thresholds::default(), false, None);

    let report = dir.path().join("report.xml");
    std::fs::write(
        &report,
        r#"<analysis><dependencies><dependency>
            <fileName>shiny-new-0.1.jar</fileName>
            <filePath>/ws/lib/shiny-new-0.1.jar</filePath>
            <vulnerabilities>
              <vulnerability><name>CVE-2016-0001</name><severity>Low</severity></vulnerability>
            </vulnerabilities>
        </dependency>
        <dependency>
            <fileName>xalan-2.7.1.jar</fileName>
            <filePath>/ws/lib/xalan-2.7.1.jar</filePath>
            <vulnerabilities>
              <vulnerability><name>CVE-2014-0107</name><severity>High</severity></vulnerability>
            </vulnerabilities>
        </dependency></dependencies></analysis>"#,
    )
    .unwrap();
    publish(&mut conn, &report, "b2", Thresholds::default(), false, None);

    let all = cli::cmd_warnings(&conn, "b2", false, false).unwrap();
    assert!(all.contains("(2 warnings)"));

    let new_only = cli::cmd_warnings(&conn, "b2", true, false).unwrap();
    assert!(new_only.contains("shiny-new-0.1.jar:CVE-2016-0001"));
    assert!(!new_only.contains("xalan"));

    let json = cli::cmd_warnings(&conn, "b2", true, true).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed[0]["severity"], "Low");
    assert_eq!(parsed[0]["identity"], "shiny-new-0.1.jar:CVE-2016-0001");
}

#[test]
fn stored_build_can_be_resubmitted() {
    let (mut conn, _dir, _) = common::setup_db();
    publish(&mut conn, Path::new(FIXTURE), "b1", Thresholds::default(), false, None);

    let tracker = RecordingTracker::default();
    let cancel = AtomicBool::new(false);
    let out = cli::cmd_submit(&conn, "b1", &tracker, "42", &cancel).unwrap();

    assert!(out.contains("Submitted 5 of 5 findings"));
    assert_eq!(tracker.submitted.borrow().len(), 5);
}
