use std::collections::BTreeSet;
use std::fmt;

use formfill_core::current_unix_timestamp_ms;
use serde::{Deserialize, Serialize};

use crate::field_mapping::FieldId;
use crate::field_writer::FieldWriteError;
use crate::record_source::OriginError;
use crate::submitter::SubmitError;

pub const RUN_REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldOutcomeKind {
    Written,
    SkippedUnknown,
    TargetNotFound,
    SurfaceFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldOutcome {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    pub outcome: FieldOutcomeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Submitted,
    ControlNotFound,
    SurfaceFailure,
}

impl fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Submitted => "submitted",
            Self::ControlNotFound => "control_not_found",
            Self::SurfaceFailure => "surface_failure",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordReport {
    pub row_number: usize,
    pub fields_written: usize,
    pub fields_skipped_unknown: usize,
    pub field_write_failures: usize,
    pub submission: SubmissionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_detail: Option<String>,
    pub fields: Vec<FieldOutcome>,
}

impl RecordReport {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            fields_written: 0,
            fields_skipped_unknown: 0,
            field_write_failures: 0,
            submission: SubmissionOutcome::Submitted,
            submission_detail: None,
            fields: Vec::new(),
        }
    }

    pub fn note_written(&mut self, label: &str, field_id: &FieldId) {
        self.fields_written = self.fields_written.saturating_add(1);
        self.fields.push(FieldOutcome {
            label: label.to_string(),
            field_id: Some(field_id.to_string()),
            outcome: FieldOutcomeKind::Written,
            detail: None,
        });
    }

    pub fn note_unknown(&mut self, label: &str) {
        self.fields_skipped_unknown = self.fields_skipped_unknown.saturating_add(1);
        self.fields.push(FieldOutcome {
            label: label.to_string(),
            field_id: None,
            outcome: FieldOutcomeKind::SkippedUnknown,
            detail: None,
        });
    }

    pub fn note_write_failure(&mut self, label: &str, field_id: &FieldId, error: &FieldWriteError) {
        self.field_write_failures = self.field_write_failures.saturating_add(1);
        let outcome = match error {
            FieldWriteError::TargetNotFound { .. } => FieldOutcomeKind::TargetNotFound,
            FieldWriteError::SurfaceFailure { .. } => FieldOutcomeKind::SurfaceFailure,
        };
        self.fields.push(FieldOutcome {
            label: label.to_string(),
            field_id: Some(field_id.to_string()),
            outcome,
            detail: Some(error.to_string()),
        });
    }

    pub fn note_submission(&mut self, result: &Result<(), SubmitError>) {
        let (submission, detail) = match result {
            Ok(()) => (SubmissionOutcome::Submitted, None),
            Err(error @ SubmitError::ControlNotFound { .. }) => {
                (SubmissionOutcome::ControlNotFound, Some(error.to_string()))
            }
            Err(error @ SubmitError::SurfaceFailure { .. }) => {
                (SubmissionOutcome::SurfaceFailure, Some(error.to_string()))
            }
        };
        self.submission = submission;
        self.submission_detail = detail;
    }

    pub fn submitted(&self) -> bool {
        self.submission == SubmissionOutcome::Submitted
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunTotals {
    pub records_processed: usize,
    pub records_submitted: usize,
    pub records_not_submitted: usize,
    pub fields_written: usize,
    pub fields_skipped_unknown: usize,
    pub field_write_failures: usize,
}

/// Outward summary of one run. Mutated only by the orchestrator while running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReport {
    pub schema_version: u32,
    pub origin: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_detail: Option<String>,
    pub started_unix_ms: u64,
    pub finished_unix_ms: u64,
    pub totals: RunTotals,
    pub unknown_labels: BTreeSet<String>,
    pub records: Vec<RecordReport>,
}

impl RunReport {
    pub fn start(origin: impl Into<String>) -> Self {
        let now = current_unix_timestamp_ms();
        Self {
            schema_version: RUN_REPORT_SCHEMA_VERSION,
            origin: origin.into(),
            status: RunStatus::Running,
            abort_reason_code: None,
            abort_detail: None,
            started_unix_ms: now,
            finished_unix_ms: now,
            totals: RunTotals::default(),
            unknown_labels: BTreeSet::new(),
            records: Vec::new(),
        }
    }

    pub fn push_record(&mut self, record: RecordReport) {
        let totals = &mut self.totals;
        totals.records_processed = totals.records_processed.saturating_add(1);
        if record.submitted() {
            totals.records_submitted = totals.records_submitted.saturating_add(1);
        } else {
            totals.records_not_submitted = totals.records_not_submitted.saturating_add(1);
        }
        totals.fields_written = totals.fields_written.saturating_add(record.fields_written);
        totals.fields_skipped_unknown = totals
            .fields_skipped_unknown
            .saturating_add(record.fields_skipped_unknown);
        totals.field_write_failures = totals
            .field_write_failures
            .saturating_add(record.field_write_failures);
        self.unknown_labels.extend(
            record
                .fields
                .iter()
                .filter(|field| field.outcome == FieldOutcomeKind::SkippedUnknown)
                .map(|field| field.label.clone()),
        );
        self.records.push(record);
    }

    pub fn finish_completed(mut self) -> Self {
        self.status = RunStatus::Completed;
        self.finished_unix_ms = current_unix_timestamp_ms();
        self
    }

    pub fn finish_aborted(mut self, error: &OriginError) -> Self {
        self.status = RunStatus::Aborted;
        self.abort_reason_code = Some(error.reason_code().to_string());
        self.abort_detail = Some(error.to_string());
        self.finished_unix_ms = current_unix_timestamp_ms();
        self
    }

    /// Completed run whose origin held no data rows.
    pub fn is_no_data(&self) -> bool {
        self.status == RunStatus::Completed && self.records.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_unix_ms.saturating_sub(self.started_unix_ms)
    }

    pub fn summary_line(&self) -> String {
        format!(
            "form replay summary: status={} origin={} records={} submitted={} not_submitted={} fields_written={} fields_skipped_unknown={} field_write_failures={} unknown_labels={} duration_ms={}",
            self.status,
            self.origin,
            self.totals.records_processed,
            self.totals.records_submitted,
            self.totals.records_not_submitted,
            self.totals.fields_written,
            self.totals.fields_skipped_unknown,
            self.totals.field_write_failures,
            if self.unknown_labels.is_empty() {
                "none".to_string()
            } else {
                self.unknown_labels.iter().cloned().collect::<Vec<_>>().join(",")
            },
            self.duration_ms(),
        )
    }

    pub fn record_lines(&self) -> Vec<String> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                format!(
                    "record[{index}] row={} written={} skipped_unknown={} write_failures={} submission={}",
                    record.row_number,
                    record.fields_written,
                    record.fields_skipped_unknown,
                    record.field_write_failures,
                    record.submission,
                )
            })
            .collect()
    }
}
