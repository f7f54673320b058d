use std::collections::BTreeMap;
use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Built-in column label to field identifier entries for the challenge form.
/// Extra surfaces extend it through `ReplayConfig::field_mappings`.
pub const DEFAULT_FIELD_MAPPINGS: [(&str, &str); 7] = [
    ("First Name", "labelFirstName"),
    ("Last Name", "labelLastName"),
    ("Email", "labelEmail"),
    ("Phone Number", "labelPhone"),
    ("Address", "labelAddress"),
    ("Role in Company", "labelRole"),
    ("Company Name", "labelCompanyName"),
];

/// Canonical name addressing one input on the surface.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(String);

impl FieldId {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            bail!("field identifier cannot be empty");
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of resolving a column label. `Unknown` is the reserved sentinel for
/// labels outside the table; resolution itself never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldResolution<'a> {
    Mapped(&'a FieldId),
    Unknown,
}

impl FieldResolution<'_> {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

/// Immutable label lookup shared read-only for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMappingTable {
    entries: BTreeMap<String, FieldId>,
}

impl Default for FieldMappingTable {
    fn default() -> Self {
        let entries = DEFAULT_FIELD_MAPPINGS
            .iter()
            .map(|(label, field_id)| ((*label).to_string(), FieldId((*field_id).to_string())))
            .collect();
        Self { entries }
    }
}

impl FieldMappingTable {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Builds a table from explicit entries, rejecting empty labels and duplicates.
    pub fn from_entries<I, L, F>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (L, F)>,
        L: Into<String>,
        F: Into<String>,
    {
        let mut table = Self::empty();
        for (label, field_id) in entries {
            let label = label.into();
            if table.entries.contains_key(label.trim()) {
                bail!("field mapping contains duplicate label '{}'", label.trim());
            }
            table.insert(label, field_id)?;
        }
        Ok(table)
    }

    /// Returns a copy of `self` with `overrides` added or replacing existing labels.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, String>) -> Result<Self> {
        let mut merged = self.clone();
        for (label, field_id) in overrides {
            merged.insert(label.clone(), field_id.clone())?;
        }
        Ok(merged)
    }

    /// Labels are stored trimmed, matching how header labels are read.
    fn insert(&mut self, label: impl Into<String>, field_id: impl Into<String>) -> Result<()> {
        let label = label.into().trim().to_string();
        if label.is_empty() {
            bail!("field mapping label cannot be empty");
        }
        let field_id = FieldId::new(field_id)
            .map_err(|error| anyhow::anyhow!("field mapping for label '{label}': {error}"))?;
        self.entries.insert(label, field_id);
        Ok(())
    }

    /// Exact-match lookup; labels outside the table resolve to `Unknown`.
    pub fn resolve(&self, label: &str) -> FieldResolution<'_> {
        match self.entries.get(label) {
            Some(field_id) => FieldResolution::Mapped(field_id),
            None => FieldResolution::Unknown,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
