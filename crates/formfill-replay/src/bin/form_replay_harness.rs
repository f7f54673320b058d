use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use formfill_core::write_json_pretty_atomic;
use formfill_replay::record_source::{DownloadDirOrigin, FileOrigin, TabularOrigin};
use formfill_replay::replay_config::{load_replay_config, validate_replay_config, ReplayConfig};
use formfill_replay::replay_orchestrator::ReplayOutcome;
use formfill_replay::run_report::RunReport;
use formfill_replay::session_bootstrap::{
    run_bootstrap, settle, BootstrapPlan, DownloadPlan, DEFAULT_DOWNLOAD_POLL_INTERVAL_MS,
    DEFAULT_DOWNLOAD_WAIT_TIMEOUT_MS,
};
use formfill_replay::surface::{Locator, SurfaceSessionManager};
use formfill_replay::surface_cli_bridge::{CliBridgeSurface, DEFAULT_COMMAND_TIMEOUT_MS};
use formfill_replay::wait_policy::WaitPolicy;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "form_replay_harness",
    about = "Replay spreadsheet records into a web form through an automation CLI",
    version,
    group(
        ArgGroup::new("origin_source")
            .required(true)
            .args(["origin", "download_dir"])
    )
)]
struct HarnessCli {
    #[arg(
        long,
        env = "FORMFILL_SURFACE_CLI",
        help = "Automation CLI implementing start-session/execute-action/shutdown-session."
    )]
    surface_cli: String,

    #[arg(
        long,
        conflicts_with = "download_dir",
        help = "Already-downloaded origin file (.xlsx, .xls, .ods, .csv)."
    )]
    origin: Option<PathBuf>,

    #[arg(
        long,
        env = "FORMFILL_DOWNLOAD_DIR",
        help = "Directory holding (or receiving) the single origin file."
    )]
    download_dir: Option<PathBuf>,

    #[arg(long, help = "Page to open before replaying.")]
    url: Option<String>,

    #[arg(
        long,
        requires = "download_dir",
        help = "Selector of the control that downloads the origin file; clears --download-dir first."
    )]
    download_selector: Option<String>,

    #[arg(long, help = "Selector of the control that reveals the form.")]
    start_selector: Option<String>,

    #[arg(long, env = "FORMFILL_CONFIG", help = "Replay config JSON file.")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "form-replay-report.json")]
    report_json_out: PathBuf,

    #[arg(long, value_parser = parse_positive_u64)]
    target_wait_timeout_ms: Option<u64>,

    #[arg(long, value_parser = parse_positive_u64)]
    target_poll_interval_ms: Option<u64>,

    #[arg(long)]
    trailing_ignored_columns: Option<usize>,

    #[arg(long, default_value_t = DEFAULT_COMMAND_TIMEOUT_MS, value_parser = parse_positive_u64)]
    command_timeout_ms: u64,

    #[arg(long, default_value_t = DEFAULT_DOWNLOAD_WAIT_TIMEOUT_MS, value_parser = parse_positive_u64)]
    download_wait_timeout_ms: u64,

    #[arg(
        long,
        default_value_t = 0,
        help = "Fixed delay after the last submission, before the session closes."
    )]
    settle_ms: u64,
}

impl HarnessCli {
    fn resolve_config(&self) -> Result<ReplayConfig> {
        let mut config = match &self.config {
            Some(path) => load_replay_config(path)?,
            None => ReplayConfig::default(),
        };
        if let Some(timeout_ms) = self.target_wait_timeout_ms {
            config.target_wait_timeout_ms = timeout_ms;
        }
        if let Some(interval_ms) = self.target_poll_interval_ms {
            config.target_poll_interval_ms = interval_ms;
        }
        if let Some(trailing) = self.trailing_ignored_columns {
            config.trailing_ignored_columns = trailing;
        }
        validate_replay_config(&config).context("invalid replay configuration after overrides")?;
        Ok(config)
    }

    fn bootstrap_plan(&self, config: &ReplayConfig) -> Result<BootstrapPlan> {
        let download = match (&self.download_selector, &self.download_dir) {
            (Some(selector), Some(dir)) => Some(DownloadPlan {
                control: Locator::new(selector.clone())?,
                download_dir: dir.clone(),
                wait: WaitPolicy::from_millis(
                    self.download_wait_timeout_ms,
                    DEFAULT_DOWNLOAD_POLL_INTERVAL_MS.min(self.download_wait_timeout_ms),
                )?,
            }),
            _ => None,
        };
        Ok(BootstrapPlan {
            url: self.url.clone(),
            download,
            start_control: self
                .start_selector
                .as_ref()
                .map(|selector| Locator::new(selector.clone()))
                .transpose()?,
            control_wait: config.wait_policy()?,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn print_report(report: &RunReport, report_path: &Path) {
    println!("{}", report.summary_line());
    for line in report.record_lines() {
        println!("{line}");
    }
    if let Some(detail) = &report.abort_detail {
        println!("abort_detail={detail}");
    }
    println!("report_json={}", report_path.display());
}

fn run() -> Result<bool> {
    let cli = HarnessCli::parse();
    init_tracing();
    let config = cli.resolve_config()?;
    let plan = cli.bootstrap_plan(&config)?;

    let surface = CliBridgeSurface::new(cli.surface_cli.clone(), cli.command_timeout_ms)
        .context("failed to initialize surface automation cli")?;
    let mut manager = SurfaceSessionManager::new(surface);
    let bootstrap = run_bootstrap(&mut manager, &plan)?;

    let origin: Box<dyn TabularOrigin> =
        match (&cli.origin, bootstrap.downloaded_origin, &cli.download_dir) {
            (Some(origin), _, _) => Box::new(FileOrigin::new(origin)),
            (None, Some(downloaded), _) => Box::new(FileOrigin::new(downloaded)),
            (None, None, Some(dir)) => Box::new(DownloadDirOrigin::new(dir)),
            (None, None, None) => bail!("either --origin or --download-dir is required"),
        };

    let mut orchestrator = config.build_orchestrator()?;
    let outcome = orchestrator.run(origin.as_ref(), manager.surface_mut()?)?;
    settle(Duration::from_millis(cli.settle_ms));

    let aborted = outcome.is_aborted();
    if let ReplayOutcome::Aborted { error, .. } = &outcome {
        eprintln!("form replay aborted: {error}");
    }
    let report = outcome.into_report();
    write_json_pretty_atomic(&cli.report_json_out, &report)
        .with_context(|| format!("failed to write {}", cli.report_json_out.display()))?;
    print_report(&report, &cli.report_json_out);

    // Teardown failure leaves the exit code of a written run unchanged.
    if let Err(error) = manager.shutdown() {
        tracing::warn!(
            reason_code = "session_shutdown_failed",
            error = %format!("{error:#}"),
            "surface session shutdown failed after the run report was written"
        );
    }
    Ok(!aborted)
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(error) => {
            eprintln!("form replay harness failed: {error:#}");
            std::process::exit(1);
        }
    }
}
