use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::clock::current_unix_timestamp_ms;

/// Streams `value` as pretty JSON (plus trailing newline) into a sibling temp
/// file, syncs it, then renames it over `path`. Readers see the old file or the
/// complete new one.
pub fn write_json_pretty_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let staging = staging_path(path)?;
    if let Err(error) = stage_json(&staging, value) {
        let _ = std::fs::remove_file(&staging);
        return Err(error);
    }
    if let Err(error) = std::fs::rename(&staging, path) {
        let _ = std::fs::remove_file(&staging);
        return Err(error).with_context(|| {
            format!("failed to move {} into place at {}", staging.display(), path.display())
        });
    }
    Ok(())
}

fn staging_path(path: &Path) -> Result<PathBuf> {
    let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
        bail!("report path '{}' has no file name", path.display());
    };
    if path.is_dir() {
        bail!("report path '{}' is a directory", path.display());
    }
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create report directory {}", dir.display()))?;
    Ok(dir.join(format!(
        ".{file_name}.{}-{}.partial",
        std::process::id(),
        current_unix_timestamp_ms()
    )))
}

fn stage_json<T: Serialize>(staging: &Path, value: &T) -> Result<()> {
    let file = File::create(staging)
        .with_context(|| format!("failed to create {}", staging.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).context("failed to serialize report json")?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .with_context(|| format!("failed to write {}", staging.display()))?;
    writer
        .get_ref()
        .sync_all()
        .with_context(|| format!("failed to sync {}", staging.display()))
}
