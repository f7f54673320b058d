use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use formfill_core::write_json_pretty_atomic;
use formfill_replay::record_source::FileOrigin;
use formfill_replay::replay_config::{parse_replay_config, ReplayConfig};
use formfill_replay::replay_orchestrator::ReplayOutcome;
use formfill_replay::run_report::{FieldOutcomeKind, RunStatus, SubmissionOutcome};
use formfill_replay::surface::{FormSurface, Locator, TargetHandle};

const CHALLENGE_CSV: &str = "\
First Name,Last Name ,Company Name,Role in Company,Address,Email,Phone Number,
John,Smith,IT Solutions,Analyst,98 North Road,jsmith@itsolutions.co.uk,40716543298,
Jane,Dorsey,MediCare,Medical Engineer,11 Crown Street,jdorsey@mc.com,40791345621,
,,,,,,,
Albert,Kipling,Waterfront,Accountant,22 Guild Street,kipling@waterfront.com,40735416854,
";

/// In-process stand-in for the challenge form. Every submission re-renders the
/// inputs, so handles from a previous record go stale.
struct ChallengeForm {
    inputs: Vec<String>,
    generation: usize,
    current: BTreeMap<String, String>,
    submissions: Vec<BTreeMap<String, String>>,
    probes: usize,
}

impl ChallengeForm {
    fn with_inputs(inputs: &[&str]) -> Self {
        Self {
            inputs: inputs.iter().map(|input| (*input).to_string()).collect(),
            generation: 0,
            current: BTreeMap::new(),
            submissions: Vec::new(),
            probes: 0,
        }
    }

    fn full() -> Self {
        Self::with_inputs(&[
            "labelFirstName",
            "labelLastName",
            "labelCompanyName",
            "labelRole",
            "labelAddress",
            "labelEmail",
            "labelPhone",
        ])
    }

    fn input_name(locator: &Locator) -> Option<&str> {
        locator
            .as_str()
            .strip_prefix("input[ng-reflect-name=\"")
            .and_then(|rest| rest.strip_suffix("\"]"))
    }

    fn target_ref(&self, name: &str) -> String {
        format!("{name}@{}", self.generation)
    }
}

impl FormSurface for ChallengeForm {
    fn probe_target(&mut self, locator: &Locator) -> Result<Option<TargetHandle>> {
        self.probes += 1;
        if locator.as_str() == "input[type=\"submit\"]" {
            return Ok(Some(TargetHandle {
                locator: locator.clone(),
                target_ref: self.target_ref("submit"),
            }));
        }
        let handle = Self::input_name(locator)
            .filter(|name| self.inputs.iter().any(|input| input == name))
            .map(|name| TargetHandle {
                locator: locator.clone(),
                target_ref: self.target_ref(name),
            });
        Ok(handle)
    }

    fn fill_target(&mut self, target: &TargetHandle, value: &str) -> Result<()> {
        let Some((name, generation)) = target.target_ref.split_once('@') else {
            bail!("malformed target ref {}", target.target_ref);
        };
        if generation != self.generation.to_string() {
            bail!("stale element reference {}", target.target_ref);
        }
        self.current.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn click_target(&mut self, target: &TargetHandle) -> Result<()> {
        if target.target_ref != self.target_ref("submit") {
            bail!("stale submit reference {}", target.target_ref);
        }
        self.submissions.push(std::mem::take(&mut self.current));
        self.generation += 1;
        Ok(())
    }
}

fn fast_config() -> ReplayConfig {
    parse_replay_config(r#"{"target_wait_timeout_ms": 30, "target_poll_interval_ms": 5}"#)
        .expect("config")
}

fn write_origin(dir: &Path, name: &str, contents: &str) -> FileOrigin {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write origin");
    FileOrigin::new(path)
}

#[test]
fn integration_challenge_sheet_is_replayed_record_by_record() {
    let temp = tempfile::tempdir().expect("tempdir");
    let origin = write_origin(temp.path(), "challenge.csv", CHALLENGE_CSV);
    let mut form = ChallengeForm::full();

    let outcome = fast_config()
        .build_orchestrator()
        .expect("orchestrator")
        .run(&origin, &mut form)
        .expect("run");
    let report = outcome.report();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.totals.records_processed, 3);
    assert_eq!(report.totals.records_submitted, 3);
    assert_eq!(report.totals.fields_written, 21);
    assert_eq!(report.totals.fields_skipped_unknown, 0);
    assert_eq!(
        report
            .records
            .iter()
            .map(|record| record.row_number)
            .collect::<Vec<_>>(),
        vec![2, 3, 5]
    );

    assert_eq!(form.submissions.len(), 3);
    assert_eq!(form.submissions[0]["labelFirstName"], "John");
    assert_eq!(form.submissions[0]["labelLastName"], "Smith");
    assert_eq!(form.submissions[0]["labelPhone"], "40716543298");
    assert_eq!(form.submissions[2]["labelCompanyName"], "Waterfront");
    assert_eq!(form.submissions[2]["labelRole"], "Accountant");
}

#[test]
fn integration_report_is_persisted_as_json() {
    let temp = tempfile::tempdir().expect("tempdir");
    let origin = write_origin(temp.path(), "challenge.csv", CHALLENGE_CSV);
    let mut form = ChallengeForm::full();
    let report = fast_config()
        .build_orchestrator()
        .expect("orchestrator")
        .run(&origin, &mut form)
        .expect("run")
        .into_report();

    let report_path = temp.path().join("out/report.json");
    write_json_pretty_atomic(&report_path, &report).expect("write report");
    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).expect("read"))
            .expect("parse");
    assert_eq!(parsed["status"], "completed");
    assert_eq!(parsed["totals"]["records_submitted"], 3);
    assert_eq!(parsed["records"][1]["fields"][0]["field_id"], "labelFirstName");
}

#[test]
fn integration_partial_form_and_extra_columns_degrade_per_field() {
    let temp = tempfile::tempdir().expect("tempdir");
    let origin = write_origin(
        temp.path(),
        "partial.csv",
        "First Name,Email,Department,Nickname,Status\nAnn,ann@example.com,Ops,Annie,\nBob,bob@example.com,Sales,Bobby,\n",
    );
    let mut config = fast_config();
    config
        .field_mappings
        .insert("Department".to_string(), "labelDepartment".to_string());
    // The form has no Email input at all.
    let mut form = ChallengeForm::with_inputs(&["labelFirstName", "labelDepartment"]);

    let report = config
        .build_orchestrator()
        .expect("orchestrator")
        .run(&origin, &mut form)
        .expect("run")
        .into_report();

    assert_eq!(report.totals.records_submitted, 2);
    assert_eq!(report.totals.fields_written, 4);
    assert_eq!(report.totals.field_write_failures, 2);
    assert_eq!(report.totals.fields_skipped_unknown, 2);
    assert_eq!(
        report.unknown_labels.iter().cloned().collect::<Vec<_>>(),
        vec!["Nickname"]
    );
    for record in &report.records {
        assert_eq!(record.submission, SubmissionOutcome::Submitted);
        assert_eq!(record.fields[1].outcome, FieldOutcomeKind::TargetNotFound);
    }
    assert_eq!(form.submissions[1]["labelDepartment"], "Sales");
}

#[test]
fn integration_missing_origin_aborts_before_touching_the_form() {
    let temp = tempfile::tempdir().expect("tempdir");
    let origin = FileOrigin::new(temp.path().join("never-downloaded.xlsx"));
    let mut form = ChallengeForm::full();

    let outcome = fast_config()
        .build_orchestrator()
        .expect("orchestrator")
        .run(&origin, &mut form)
        .expect("run");

    match &outcome {
        ReplayOutcome::Aborted { error, report } => {
            assert_eq!(error.reason_code(), "origin_unreadable");
            assert_eq!(report.status, RunStatus::Aborted);
            assert!(report.records.is_empty());
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(form.probes, 0);
    assert!(form.submissions.is_empty());
}

#[test]
fn integration_header_only_origin_completes_with_no_data() {
    let temp = tempfile::tempdir().expect("tempdir");
    let origin = write_origin(temp.path(), "empty.csv", "First Name,Email,Status\n,,\n");
    let mut form = ChallengeForm::full();

    let outcome = fast_config()
        .build_orchestrator()
        .expect("orchestrator")
        .run(&origin, &mut form)
        .expect("run");

    assert!(matches!(outcome, ReplayOutcome::Completed(_)));
    assert!(outcome.report().is_no_data());
    assert_eq!(form.probes, 0);
}

#[test]
fn integration_replaying_the_same_origin_twice_submits_identical_records() {
    let temp = tempfile::tempdir().expect("tempdir");
    let origin = write_origin(temp.path(), "challenge.csv", CHALLENGE_CSV);

    let mut first_form = ChallengeForm::full();
    let mut second_form = ChallengeForm::full();
    for form in [&mut first_form, &mut second_form] {
        fast_config()
            .build_orchestrator()
            .expect("orchestrator")
            .run(&origin, form)
            .expect("run");
    }
    assert_eq!(first_form.submissions, second_form.submissions);
}
