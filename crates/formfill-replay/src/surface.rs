use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::field_mapping::FieldId;

pub const DEFAULT_TARGET_ELEMENT: &str = "input";
pub const DEFAULT_TARGET_ATTRIBUTE: &str = "ng-reflect-name";
pub const DEFAULT_SUBMIT_SELECTOR: &str = "input[type=\"submit\"]";

/// Opaque selector understood by the surface backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(selector: impl Into<String>) -> Result<Self> {
        let selector = selector.into();
        if selector.trim().is_empty() {
            bail!("surface locator cannot be empty");
        }
        Ok(Self(selector.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attribute-based addressing: `element[attribute="<field id>"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressingScheme {
    pub element: String,
    pub attribute: String,
}

impl Default for AddressingScheme {
    fn default() -> Self {
        Self {
            element: DEFAULT_TARGET_ELEMENT.to_string(),
            attribute: DEFAULT_TARGET_ATTRIBUTE.to_string(),
        }
    }
}

impl AddressingScheme {
    pub fn validate(&self) -> Result<()> {
        if self.element.trim().is_empty() {
            bail!("addressing element cannot be empty");
        }
        if self.attribute.trim().is_empty() {
            bail!("addressing attribute cannot be empty");
        }
        Ok(())
    }

    pub fn address(&self, field_id: &FieldId) -> Locator {
        let escaped = field_id.as_str().replace('\\', "\\\\").replace('"', "\\\"");
        Locator(format!(
            "{}[{}=\"{}\"]",
            self.element.trim(),
            self.attribute.trim(),
            escaped
        ))
    }
}

/// Live handle to one located target. Valid only until the surface re-renders,
/// so callers re-probe before every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHandle {
    pub locator: Locator,
    pub target_ref: String,
}

/// The rendered form the replay loop acts on. Implementations must report an
/// absent target as `Ok(None)`; `Err` is reserved for backend failures.
pub trait FormSurface {
    fn probe_target(&mut self, locator: &Locator) -> Result<Option<TargetHandle>>;
    fn fill_target(&mut self, target: &TargetHandle, value: &str) -> Result<()>;
    fn click_target(&mut self, target: &TargetHandle) -> Result<()>;
}

impl<S: FormSurface + ?Sized> FormSurface for &mut S {
    fn probe_target(&mut self, locator: &Locator) -> Result<Option<TargetHandle>> {
        (**self).probe_target(locator)
    }

    fn fill_target(&mut self, target: &TargetHandle, value: &str) -> Result<()> {
        (**self).fill_target(target, value)
    }

    fn click_target(&mut self, target: &TargetHandle) -> Result<()> {
        (**self).click_target(target)
    }
}

/// Session lifecycle for the bootstrap boundary; the replay loop never calls these.
pub trait SurfaceSession: FormSurface {
    fn start_session(&mut self) -> Result<()>;
    fn navigate(&mut self, url: &str) -> Result<()>;
    fn shutdown_session(&mut self) -> Result<()>;
}

#[derive(Debug)]
pub struct SurfaceSessionManager<S: SurfaceSession> {
    surface: S,
    session_started: bool,
    session_shutdown: bool,
}

impl<S: SurfaceSession> SurfaceSessionManager<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            session_started: false,
            session_shutdown: false,
        }
    }

    pub fn ensure_session_started(&mut self) -> Result<()> {
        if self.session_shutdown {
            bail!("surface session was already shut down");
        }
        if self.session_started {
            return Ok(());
        }
        self.surface.start_session()?;
        self.session_started = true;
        Ok(())
    }

    pub fn navigate(&mut self, url: &str) -> Result<()> {
        if url.trim().is_empty() {
            bail!("navigation url cannot be empty");
        }
        self.ensure_session_started()?;
        self.surface.navigate(url.trim())
    }

    /// Started surface handed to the replay core.
    pub fn surface_mut(&mut self) -> Result<&mut S> {
        self.ensure_session_started()?;
        Ok(&mut self.surface)
    }

    pub fn shutdown(&mut self) -> Result<()> {
        if !self.session_started || self.session_shutdown {
            return Ok(());
        }
        self.session_shutdown = true;
        self.surface.shutdown_session()
    }
}

impl<S: SurfaceSession> Drop for SurfaceSessionManager<S> {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
