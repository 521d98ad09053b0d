//! JSON snapshot document written at the end of a run.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::post::PostRecord;

/// The persisted result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Completion time, ISO-8601 UTC.
    pub scraped_at: String,
    /// Profile handle, or the search sentinel.
    pub target: String,
    pub query: Option<String>,
    pub regex: bool,
    pub exact: bool,
    pub count: usize,
    pub posts: Vec<PostRecord>,
}

impl Snapshot {
    #[must_use]
    pub fn new(
        scraped_at: DateTime<Utc>,
        target: impl Into<String>,
        query: Option<String>,
        regex: bool,
        exact: bool,
        posts: Vec<PostRecord>,
    ) -> Self {
        Self {
            scraped_at: scraped_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            target: target.into(),
            query,
            regex,
            exact,
            count: posts.len(),
            posts,
        }
    }

    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize snapshot")
    }

    /// Write the snapshot to `path` atomically.
    ///
    /// The document goes to a temporary file in the destination directory and
    /// is renamed into place, so a failed write never leaves a partial file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is not writable or the rename fails.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let dest = path.to_path_buf();

        tokio::task::spawn_blocking(move || write_atomic(&dest, json.as_bytes()))
            .await
            .context("Snapshot writer task panicked")??;

        info!(path = %path.display(), count = self.count, "Snapshot written");
        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    tmp.write_all(contents)
        .context("Failed to write snapshot contents")?;
    tmp.flush().context("Failed to flush snapshot")?;
    set_snapshot_permissions(tmp.as_file(), path)?;
    tmp.persist(path)
        .with_context(|| format!("Failed to move snapshot into {}", path.display()))?;
    Ok(())
}

/// Temp files are created owner-only. Give the snapshot the mode of the file
/// it replaces, or 0644 for a new one.
#[cfg(unix)]
fn set_snapshot_permissions(file: &std::fs::File, path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path).map_or(0o644, |meta| meta.permissions().mode() & 0o777);
    file.set_permissions(std::fs::Permissions::from_mode(mode))
        .context("Failed to set snapshot permissions")
}

#[cfg(not(unix))]
fn set_snapshot_permissions(_file: &std::fs::File, _path: &Path) -> Result<()> {
    Ok(())
}
