use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use wait_timeout::ChildExt;

use crate::surface::{FormSurface, Locator, SurfaceSession, TargetHandle};

pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;
pub const SURFACE_ERROR_TARGET_NOT_FOUND: &str = "surface_target_not_found";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceOperation {
    Navigate,
    Probe,
    Fill,
    Click,
}

/// JSON payload passed to `execute-action`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SurfaceActionRequest {
    pub operation: SurfaceOperation,
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub target_ref: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub text: String,
}

impl SurfaceActionRequest {
    fn for_target(operation: SurfaceOperation, target: &TargetHandle) -> Self {
        Self {
            operation,
            selector: target.locator.as_str().to_string(),
            target_ref: target.target_ref.clone(),
            url: String::new(),
            text: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SurfaceActionResult {
    pub status_code: u16,
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub response_body: serde_json::Value,
}

impl SurfaceActionResult {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    fn is_target_absent(&self) -> bool {
        self.status_code == 404 || self.error_code == SURFACE_ERROR_TARGET_NOT_FOUND
    }

    fn failure_detail(&self) -> String {
        let code = if self.error_code.trim().is_empty() {
            "none"
        } else {
            self.error_code.trim()
        };
        format!(
            "status_code={} error_code={} body={}",
            self.status_code, code, self.response_body
        )
    }
}

/// Surface backed by an external automation CLI (Playwright, Selenium shim, ...).
#[derive(Debug)]
pub struct CliBridgeSurface {
    cli_path: String,
    command_timeout: Duration,
}

impl CliBridgeSurface {
    pub fn new(cli_path: impl Into<String>, command_timeout_ms: u64) -> Result<Self> {
        let cli_path = cli_path.into();
        if cli_path.trim().is_empty() {
            bail!("surface automation cli path cannot be empty");
        }
        if command_timeout_ms == 0 {
            bail!("surface command timeout must be greater than 0");
        }
        Ok(Self {
            cli_path: cli_path.trim().to_string(),
            command_timeout: Duration::from_millis(command_timeout_ms),
        })
    }

    fn invoke_command(&self, subcommand: &str, payload: Option<&SurfaceActionRequest>) -> Result<String> {
        let mut command = Command::new(&self.cli_path);
        command
            .arg(subcommand)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(payload) = payload {
            command.arg(
                serde_json::to_string(payload).context("serialize surface action request")?,
            );
        }
        tracing::debug!(cli = %self.cli_path, subcommand, "invoking surface cli");

        let mut child = command.spawn().with_context(|| {
            format!("failed to launch surface automation cli '{}'", self.cli_path)
        })?;
        if child
            .wait_timeout(self.command_timeout)
            .context("failed while waiting for surface automation cli")?
            .is_none()
        {
            let _ = child.kill();
            let _ = child.wait();
            bail!(
                "surface cli subcommand '{subcommand}' timed out after {} ms",
                self.command_timeout.as_millis()
            );
        }
        let output = child
            .wait_with_output()
            .context("failed to collect surface automation cli output")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let detail = if !stderr.is_empty() {
                stderr
            } else if !stdout.is_empty() {
                stdout
            } else {
                "no output".to_string()
            };
            bail!("surface cli subcommand '{subcommand}' failed: {detail}");
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn execute_action(&self, request: &SurfaceActionRequest) -> Result<SurfaceActionResult> {
        let output = self.invoke_command("execute-action", Some(request))?;
        if output.is_empty() {
            bail!("surface cli returned empty response for execute-action");
        }
        let parsed = serde_json::from_str::<SurfaceActionResult>(&output)
            .with_context(|| format!("failed to parse surface cli response: {output}"))?;
        if parsed.status_code == 0 {
            bail!("surface cli response is missing non-zero status_code");
        }
        Ok(parsed)
    }

    fn execute_expecting_success(&self, request: &SurfaceActionRequest) -> Result<()> {
        let result = self.execute_action(request)?;
        if !result.is_success() {
            bail!(
                "surface {:?} on '{}' rejected: {}",
                request.operation,
                request.selector,
                result.failure_detail()
            );
        }
        Ok(())
    }
}

impl FormSurface for CliBridgeSurface {
    fn probe_target(&mut self, locator: &Locator) -> Result<Option<TargetHandle>> {
        let request = SurfaceActionRequest {
            operation: SurfaceOperation::Probe,
            selector: locator.as_str().to_string(),
            target_ref: String::new(),
            url: String::new(),
            text: String::new(),
        };
        let result = self.execute_action(&request)?;
        if result.is_target_absent() {
            return Ok(None);
        }
        if !result.is_success() {
            bail!("surface probe for '{locator}' failed: {}", result.failure_detail());
        }
        let target_ref = result
            .response_body
            .get("target_ref")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|target_ref| !target_ref.is_empty())
            .with_context(|| format!("surface probe for '{locator}' returned no target_ref"))?;
        Ok(Some(TargetHandle {
            locator: locator.clone(),
            target_ref: target_ref.to_string(),
        }))
    }

    fn fill_target(&mut self, target: &TargetHandle, value: &str) -> Result<()> {
        let mut request = SurfaceActionRequest::for_target(SurfaceOperation::Fill, target);
        request.text = value.to_string();
        self.execute_expecting_success(&request)
    }

    fn click_target(&mut self, target: &TargetHandle) -> Result<()> {
        self.execute_expecting_success(&SurfaceActionRequest::for_target(
            SurfaceOperation::Click,
            target,
        ))
    }
}

impl SurfaceSession for CliBridgeSurface {
    fn start_session(&mut self) -> Result<()> {
        self.invoke_command("start-session", None)?;
        Ok(())
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        self.execute_expecting_success(&SurfaceActionRequest {
            operation: SurfaceOperation::Navigate,
            selector: String::new(),
            target_ref: String::new(),
            url: url.to_string(),
            text: String::new(),
        })
    }

    fn shutdown_session(&mut self) -> Result<()> {
        self.invoke_command("shutdown-session", None)?;
        Ok(())
    }
}
