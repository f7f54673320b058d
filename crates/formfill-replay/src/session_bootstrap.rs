//! Thin one-shot steps that bring a surface to the point where replay can start:
//! navigate, fetch the origin file, press the start control.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::record_source::{discover_origin_file, OriginError};
use crate::surface::{FormSurface, Locator, SurfaceSession, SurfaceSessionManager};
use crate::wait_policy::{poll_until, PollOutcome, WaitPolicy};

pub const DEFAULT_DOWNLOAD_WAIT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_DOWNLOAD_POLL_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub control: Locator,
    pub download_dir: PathBuf,
    pub wait: WaitPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapPlan {
    pub url: Option<String>,
    pub download: Option<DownloadPlan>,
    pub start_control: Option<Locator>,
    /// Lookup bound for the download and start controls.
    pub control_wait: WaitPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub downloaded_origin: Option<PathBuf>,
    pub start_clicked: bool,
}

/// Removes every file in `dir` (creating it when absent) and returns how many went.
pub fn clear_download_dir(dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut removed = 0usize;
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?
    {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", dir.display()))?
            .path();
        if path.is_file() {
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            removed = removed.saturating_add(1);
        }
    }
    Ok(removed)
}

/// Probes for `control` within `wait` and clicks it. `Ok(false)` when it never rendered.
pub fn click_control<S: FormSurface + ?Sized>(
    surface: &mut S,
    control: &Locator,
    wait: &WaitPolicy,
) -> Result<bool> {
    match poll_until(wait, || surface.probe_target(control))? {
        PollOutcome::Ready { value, .. } => {
            surface.click_target(&value)?;
            Ok(true)
        }
        PollOutcome::TimedOut { .. } => Ok(false),
    }
}

/// Waits until exactly one completed file sits in `dir`.
pub fn wait_for_origin_file(dir: &Path, wait: &WaitPolicy) -> Result<PathBuf> {
    let outcome = poll_until(wait, || match discover_origin_file(dir) {
        Ok(path) => Ok(Some(path)),
        Err(OriginError::Missing { .. }) => Ok(None),
        Err(error) => Err(error.into()),
    })?;
    match outcome {
        PollOutcome::Ready { value, waited, .. } => {
            tracing::info!(
                origin = %value.display(),
                waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                "origin file downloaded"
            );
            Ok(value)
        }
        PollOutcome::TimedOut { waited, .. } => bail!(
            "no completed origin file appeared in {} within {} ms",
            dir.display(),
            waited.as_millis()
        ),
    }
}

pub fn download_origin<S: FormSurface + ?Sized>(
    surface: &mut S,
    plan: &DownloadPlan,
    control_wait: &WaitPolicy,
) -> Result<PathBuf> {
    let removed = clear_download_dir(&plan.download_dir)?;
    tracing::debug!(
        dir = %plan.download_dir.display(),
        removed,
        "cleared download directory"
    );
    if !click_control(surface, &plan.control, control_wait)? {
        bail!("download control '{}' not found", plan.control);
    }
    wait_for_origin_file(&plan.download_dir, &plan.wait)
}

pub fn run_bootstrap<S: SurfaceSession>(
    manager: &mut SurfaceSessionManager<S>,
    plan: &BootstrapPlan,
) -> Result<BootstrapReport> {
    let mut report = BootstrapReport::default();
    if let Some(url) = plan.url.as_deref() {
        manager
            .navigate(url)
            .with_context(|| format!("failed to navigate to {url}"))?;
    }
    let surface = manager.surface_mut()?;
    if let Some(download) = &plan.download {
        report.downloaded_origin = Some(download_origin(surface, download, &plan.control_wait)?);
    }
    if let Some(start) = &plan.start_control {
        report.start_clicked = click_control(surface, start, &plan.control_wait)?;
        if !report.start_clicked {
            tracing::warn!(
                control = %start,
                reason_code = "control_not_found",
                "start control not found; replaying against current surface state"
            );
        }
    }
    Ok(report)
}

/// Fixed settle delay, allowed only outside the replay loop.
pub fn settle(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use tempfile::tempdir;

    use super::{
        clear_download_dir, run_bootstrap, wait_for_origin_file, BootstrapPlan, DownloadPlan,
    };
    use crate::surface::{FormSurface, Locator, SurfaceSession, SurfaceSessionManager, TargetHandle};
    use crate::wait_policy::WaitPolicy;

    #[derive(Debug, Default)]
    struct BrowserLog {
        navigations: Vec<String>,
        clicks: Vec<String>,
    }

    /// Clicking `a.download` drops a spreadsheet into `download_dir`.
    struct DownloadingBrowser {
        log: Arc<Mutex<BrowserLog>>,
        download_dir: PathBuf,
        has_start_button: bool,
    }

    impl FormSurface for DownloadingBrowser {
        fn probe_target(&mut self, locator: &Locator) -> Result<Option<TargetHandle>> {
            let present = locator.as_str() == "a.download"
                || (self.has_start_button && locator.as_str() == "button.start");
            Ok(present.then(|| TargetHandle {
                locator: locator.clone(),
                target_ref: locator.as_str().to_string(),
            }))
        }

        fn fill_target(&mut self, _target: &TargetHandle, _value: &str) -> Result<()> {
            Ok(())
        }

        fn click_target(&mut self, target: &TargetHandle) -> Result<()> {
            if target.target_ref == "a.download" {
                std::fs::write(self.download_dir.join("challenge.csv"), "First Name\n")?;
            }
            self.log
                .lock()
                .expect("lock")
                .clicks
                .push(target.target_ref.clone());
            Ok(())
        }
    }

    impl SurfaceSession for DownloadingBrowser {
        fn start_session(&mut self) -> Result<()> {
            Ok(())
        }

        fn navigate(&mut self, url: &str) -> Result<()> {
            self.log
                .lock()
                .expect("lock")
                .navigations
                .push(url.to_string());
            Ok(())
        }

        fn shutdown_session(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn fast_wait() -> WaitPolicy {
        WaitPolicy::from_millis(100, 10).expect("policy")
    }

    #[test]
    fn unit_clear_download_dir_removes_stale_files_and_creates_missing_dir() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("downloads");
        assert_eq!(clear_download_dir(&dir).expect("create"), 0);
        std::fs::write(dir.join("old.xlsx"), "stale").expect("write");
        std::fs::write(dir.join("old.csv"), "stale").expect("write");
        assert_eq!(clear_download_dir(&dir).expect("clear"), 2);
        assert_eq!(std::fs::read_dir(&dir).expect("read").count(), 0);
    }

    #[test]
    fn functional_bootstrap_navigates_downloads_and_starts() {
        let temp = tempdir().expect("tempdir");
        let download_dir = temp.path().join("downloads");
        std::fs::create_dir_all(&download_dir).expect("mkdir");
        std::fs::write(download_dir.join("previous-run.xlsx"), "stale").expect("write");
        let log = Arc::new(Mutex::new(BrowserLog::default()));
        let mut manager = SurfaceSessionManager::new(DownloadingBrowser {
            log: log.clone(),
            download_dir: download_dir.clone(),
            has_start_button: true,
        });

        let plan = BootstrapPlan {
            url: Some("https://form.test/".to_string()),
            download: Some(DownloadPlan {
                control: Locator::new("a.download").expect("locator"),
                download_dir: download_dir.clone(),
                wait: fast_wait(),
            }),
            start_control: Some(Locator::new("button.start").expect("locator")),
            control_wait: fast_wait(),
        };
        let report = run_bootstrap(&mut manager, &plan).expect("bootstrap");

        assert_eq!(
            report.downloaded_origin,
            Some(download_dir.join("challenge.csv"))
        );
        assert!(report.start_clicked);
        let log = log.lock().expect("lock");
        assert_eq!(log.navigations, vec!["https://form.test/"]);
        assert_eq!(log.clicks, vec!["a.download", "button.start"]);
    }

    #[test]
    fn regression_missing_start_control_is_not_fatal() {
        let temp = tempdir().expect("tempdir");
        let log = Arc::new(Mutex::new(BrowserLog::default()));
        let mut manager = SurfaceSessionManager::new(DownloadingBrowser {
            log: log.clone(),
            download_dir: temp.path().to_path_buf(),
            has_start_button: false,
        });
        let plan = BootstrapPlan {
            start_control: Some(Locator::new("button.start").expect("locator")),
            control_wait: fast_wait(),
            ..BootstrapPlan::default()
        };
        let report = run_bootstrap(&mut manager, &plan).expect("bootstrap");
        assert!(!report.start_clicked);
        assert!(log.lock().expect("lock").clicks.is_empty());
    }

    #[test]
    fn regression_download_wait_times_out_when_nothing_arrives() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("challenge.xlsx.crdownload"), "partial").expect("write");
        let error = wait_for_origin_file(temp.path(), &fast_wait()).expect_err("timeout");
        assert!(error.to_string().contains("no completed origin file"));
    }
}
