//! Record-by-record replay of a tabular origin onto a form surface.
//!
//! Failures are scoped as narrowly as possible: an unknown column or missing
//! input costs one field, a missing submit control costs one record, and only
//! an unreadable origin ends the run.

use thiserror::Error;

use crate::field_mapping::{FieldMappingTable, FieldResolution};
use crate::field_writer::FieldWriter;
use crate::record_source::{OriginError, Record, RecordSource, RecordSourceOptions, TabularOrigin};
use crate::run_report::{RecordReport, RunReport};
use crate::submitter::Submitter;
use crate::surface::FormSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    Dispatching { record_index: usize },
    Completed,
    Aborted,
}

impl ReplayState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Idle, Self::Dispatching { record_index }) => record_index == 0,
            (Self::Idle, Self::Completed) | (Self::Idle, Self::Aborted) => true,
            (
                Self::Dispatching { record_index },
                Self::Dispatching {
                    record_index: next_index,
                },
            ) => next_index == record_index + 1,
            (Self::Dispatching { .. }, Self::Completed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid replay transition: {from:?} -> {to:?}")]
pub struct ReplayTransitionError {
    pub from: ReplayState,
    pub to: ReplayState,
}

/// Terminal result of one run. Both variants carry a finalized report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    Completed(RunReport),
    Aborted { error: OriginError, report: RunReport },
}

impl ReplayOutcome {
    pub fn report(&self) -> &RunReport {
        match self {
            Self::Completed(report) | Self::Aborted { report, .. } => report,
        }
    }

    pub fn into_report(self) -> RunReport {
        match self {
            Self::Completed(report) | Self::Aborted { report, .. } => report,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Owns the per-run collaborators; the surface is lent for the duration of `run`.
#[derive(Debug, Clone)]
pub struct ReplayOrchestrator {
    mapping: FieldMappingTable,
    writer: FieldWriter,
    submitter: Submitter,
    source_options: RecordSourceOptions,
    state: ReplayState,
}

impl ReplayOrchestrator {
    pub fn new(
        mapping: FieldMappingTable,
        writer: FieldWriter,
        submitter: Submitter,
        source_options: RecordSourceOptions,
    ) -> Self {
        Self {
            mapping,
            writer,
            submitter,
            source_options,
            state: ReplayState::Idle,
        }
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    pub fn mapping(&self) -> &FieldMappingTable {
        &self.mapping
    }

    fn transition(&mut self, next: ReplayState) -> Result<(), ReplayTransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(ReplayTransitionError {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(from = ?self.state, to = ?next, "replay state transition");
        self.state = next;
        Ok(())
    }

    /// Runs the full pipeline once. Re-running requires a fresh orchestrator.
    pub fn run<O, S>(
        &mut self,
        origin: &O,
        surface: &mut S,
    ) -> Result<ReplayOutcome, ReplayTransitionError>
    where
        O: TabularOrigin + ?Sized,
        S: FormSurface + ?Sized,
    {
        if self.state != ReplayState::Idle {
            return Err(ReplayTransitionError {
                from: self.state,
                to: ReplayState::Idle,
            });
        }
        let mut report = RunReport::start(origin.describe());

        let source = match RecordSource::open(origin, self.source_options) {
            Ok(source) => source,
            Err(error) => {
                self.transition(ReplayState::Aborted)?;
                tracing::error!(
                    origin = %report.origin,
                    reason_code = error.reason_code(),
                    error = %error,
                    "replay aborted: origin unreadable"
                );
                let report = report.finish_aborted(&error);
                return Ok(ReplayOutcome::Aborted { error, report });
            }
        };

        for (record_index, record) in source.records().enumerate() {
            self.transition(ReplayState::Dispatching { record_index })?;
            let record_report = self.dispatch_record(&record, surface);
            tracing::info!(
                row = record_report.row_number,
                written = record_report.fields_written,
                skipped_unknown = record_report.fields_skipped_unknown,
                write_failures = record_report.field_write_failures,
                submission = %record_report.submission,
                "record replayed"
            );
            report.push_record(record_report);
        }

        self.transition(ReplayState::Completed)?;
        let report = report.finish_completed();
        if report.is_no_data() {
            tracing::warn!(origin = %report.origin, "origin contained no data rows");
        } else {
            tracing::info!(
                records = report.totals.records_processed,
                submitted = report.totals.records_submitted,
                "replay completed"
            );
        }
        Ok(ReplayOutcome::Completed(report))
    }

    fn dispatch_record<S: FormSurface + ?Sized>(
        &self,
        record: &Record,
        surface: &mut S,
    ) -> RecordReport {
        let mut record_report = RecordReport::new(record.row_number);
        for (label, value) in record.pairs() {
            let field_id = match self.mapping.resolve(label) {
                FieldResolution::Mapped(field_id) => field_id,
                FieldResolution::Unknown => {
                    tracing::warn!(
                        row = record.row_number,
                        label = label,
                        reason_code = "unknown_column",
                        "skipping column with no field mapping"
                    );
                    record_report.note_unknown(label);
                    continue;
                }
            };
            match self.writer.write(surface, field_id, value) {
                Ok(()) => record_report.note_written(label, field_id),
                Err(error) => {
                    tracing::warn!(
                        row = record.row_number,
                        label = label,
                        field_id = %field_id,
                        reason_code = error.reason_code(),
                        error = %error,
                        "field write failed; continuing with next field"
                    );
                    record_report.note_write_failure(label, field_id, &error);
                }
            }
        }

        let submission = self.submitter.submit(surface);
        if let Err(error) = &submission {
            tracing::warn!(
                row = record.row_number,
                reason_code = error.reason_code(),
                error = %error,
                "record not submitted; continuing with next record"
            );
        }
        record_report.note_submission(&submission);
        record_report
    }
}
