use thiserror::Error;

use crate::field_mapping::FieldId;
use crate::surface::{AddressingScheme, FormSurface, Locator};
use crate::wait_policy::{poll_until, PollOutcome, WaitPolicy};

/// Per-field failures. Neither aborts the record it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldWriteError {
    #[error("target for field '{field_id}' ({locator}) not found after {waited_ms} ms")]
    TargetNotFound {
        field_id: FieldId,
        locator: Locator,
        waited_ms: u64,
    },
    #[error("surface failed while writing field '{field_id}': {detail}")]
    SurfaceFailure { field_id: FieldId, detail: String },
}

impl FieldWriteError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::TargetNotFound { .. } => "target_not_found",
            Self::SurfaceFailure { .. } => "surface_failure",
        }
    }
}

/// Locates the live input for a field and sets its content. A single attempt
/// per call; the only waiting is the bounded render wait on lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWriter {
    addressing: AddressingScheme,
    wait: WaitPolicy,
}

impl FieldWriter {
    pub fn new(addressing: AddressingScheme, wait: WaitPolicy) -> Self {
        Self { addressing, wait }
    }

    pub fn write<S: FormSurface + ?Sized>(
        &self,
        surface: &mut S,
        field_id: &FieldId,
        value: &str,
    ) -> Result<(), FieldWriteError> {
        let locator = self.addressing.address(field_id);
        let surface_failure = |error: anyhow::Error| FieldWriteError::SurfaceFailure {
            field_id: field_id.clone(),
            detail: format!("{error:#}"),
        };

        let target = match poll_until(&self.wait, || surface.probe_target(&locator))
            .map_err(surface_failure)?
        {
            PollOutcome::Ready { value, .. } => value,
            PollOutcome::TimedOut { waited, .. } => {
                return Err(FieldWriteError::TargetNotFound {
                    field_id: field_id.clone(),
                    locator,
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };

        tracing::debug!(
            field_id = %field_id,
            locator = %target.locator,
            target_ref = %target.target_ref,
            value_chars = value.chars().count(),
            "writing field value"
        );
        surface
            .fill_target(&target, value)
            .map_err(surface_failure)
    }
}
