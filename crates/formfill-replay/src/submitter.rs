use thiserror::Error;

use crate::surface::{FormSurface, Locator};
use crate::wait_policy::{poll_until, PollOutcome, WaitPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("submission control ({locator}) not found after {waited_ms} ms")]
    ControlNotFound { locator: Locator, waited_ms: u64 },
    #[error("surface failed while submitting: {detail}")]
    SurfaceFailure { detail: String },
}

impl SubmitError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ControlNotFound { .. } => "control_not_found",
            Self::SurfaceFailure { .. } => "surface_failure",
        }
    }
}

/// Triggers the form's single submission control, once per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitter {
    control: Locator,
    wait: WaitPolicy,
}

impl Submitter {
    pub fn new(control: Locator, wait: WaitPolicy) -> Self {
        Self { control, wait }
    }

    pub fn submit<S: FormSurface + ?Sized>(&self, surface: &mut S) -> Result<(), SubmitError> {
        let surface_failure = |error: anyhow::Error| SubmitError::SurfaceFailure {
            detail: format!("{error:#}"),
        };
        let control = match poll_until(&self.wait, || surface.probe_target(&self.control))
            .map_err(surface_failure)?
        {
            PollOutcome::Ready { value, .. } => value,
            PollOutcome::TimedOut { waited, .. } => {
                return Err(SubmitError::ControlNotFound {
                    locator: self.control.clone(),
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };
        surface.click_target(&control).map_err(surface_failure)
    }
}
