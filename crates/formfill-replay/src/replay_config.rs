use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::field_mapping::FieldMappingTable;
use crate::field_writer::FieldWriter;
use crate::record_source::{RecordSourceOptions, DEFAULT_TRAILING_IGNORED_COLUMNS};
use crate::replay_orchestrator::ReplayOrchestrator;
use crate::submitter::Submitter;
use crate::surface::{AddressingScheme, Locator, DEFAULT_SUBMIT_SELECTOR};
use crate::wait_policy::{WaitPolicy, DEFAULT_TARGET_POLL_INTERVAL_MS, DEFAULT_TARGET_WAIT_TIMEOUT_MS};

pub const REPLAY_CONFIG_SCHEMA_VERSION: u32 = 1;

fn replay_config_schema_version() -> u32 {
    REPLAY_CONFIG_SCHEMA_VERSION
}

fn default_submit_selector() -> String {
    DEFAULT_SUBMIT_SELECTOR.to_string()
}

fn default_target_wait_timeout_ms() -> u64 {
    DEFAULT_TARGET_WAIT_TIMEOUT_MS
}

fn default_target_poll_interval_ms() -> u64 {
    DEFAULT_TARGET_POLL_INTERVAL_MS
}

fn default_trailing_ignored_columns() -> usize {
    DEFAULT_TRAILING_IGNORED_COLUMNS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReplayConfig {
    #[serde(default = "replay_config_schema_version")]
    pub schema_version: u32,
    /// Merged over the built-in table; an entry with a known label replaces it.
    #[serde(default)]
    pub field_mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub addressing: AddressingScheme,
    #[serde(default = "default_submit_selector")]
    pub submit_selector: String,
    #[serde(default = "default_target_wait_timeout_ms")]
    pub target_wait_timeout_ms: u64,
    #[serde(default = "default_target_poll_interval_ms")]
    pub target_poll_interval_ms: u64,
    #[serde(default = "default_trailing_ignored_columns")]
    pub trailing_ignored_columns: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            schema_version: REPLAY_CONFIG_SCHEMA_VERSION,
            field_mappings: BTreeMap::new(),
            addressing: AddressingScheme::default(),
            submit_selector: default_submit_selector(),
            target_wait_timeout_ms: DEFAULT_TARGET_WAIT_TIMEOUT_MS,
            target_poll_interval_ms: DEFAULT_TARGET_POLL_INTERVAL_MS,
            trailing_ignored_columns: DEFAULT_TRAILING_IGNORED_COLUMNS,
        }
    }
}

pub fn parse_replay_config(raw: &str) -> Result<ReplayConfig> {
    let config =
        serde_json::from_str::<ReplayConfig>(raw).context("failed to parse replay config")?;
    validate_replay_config(&config)?;
    Ok(config)
}

pub fn load_replay_config(path: &Path) -> Result<ReplayConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read replay config {}", path.display()))?;
    parse_replay_config(&raw).with_context(|| format!("invalid replay config {}", path.display()))
}

pub fn validate_replay_config(config: &ReplayConfig) -> Result<()> {
    if config.schema_version != REPLAY_CONFIG_SCHEMA_VERSION {
        bail!(
            "unsupported replay config schema version {} (expected {})",
            config.schema_version,
            REPLAY_CONFIG_SCHEMA_VERSION
        );
    }
    config.addressing.validate()?;
    if config.submit_selector.trim().is_empty() {
        bail!("submit_selector cannot be empty");
    }
    config.wait_policy()?;
    config.mapping_table()?;
    Ok(())
}

impl ReplayConfig {
    pub fn wait_policy(&self) -> Result<WaitPolicy> {
        WaitPolicy::from_millis(self.target_wait_timeout_ms, self.target_poll_interval_ms)
    }

    pub fn mapping_table(&self) -> Result<FieldMappingTable> {
        FieldMappingTable::default().with_overrides(&self.field_mappings)
    }

    pub fn record_source_options(&self) -> RecordSourceOptions {
        RecordSourceOptions {
            trailing_ignored_columns: self.trailing_ignored_columns,
        }
    }

    /// Assembles a ready-to-run orchestrator from this configuration.
    pub fn build_orchestrator(&self) -> Result<ReplayOrchestrator> {
        validate_replay_config(self)?;
        let wait = self.wait_policy()?;
        Ok(ReplayOrchestrator::new(
            self.mapping_table()?,
            FieldWriter::new(self.addressing.clone(), wait),
            Submitter::new(Locator::new(self.submit_selector.clone())?, wait),
            self.record_source_options(),
        ))
    }
}
