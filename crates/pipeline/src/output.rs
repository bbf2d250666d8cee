use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Pretty-print `value` to `dir/name`, creating `dir` if needed.
pub async fn write_json<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .await
        .context(format!("Failed to create output directory: {:?}", dir))?;

    let path = dir.join(name);
    let json = serde_json::to_string_pretty(value)
        .context(format!("Failed to serialize {}", name))?;
    fs::write(&path, json)
        .await
        .context(format!("Failed to write {:?}", path))?;

    tracing::debug!(path = %path.display(), "Wrote output table");
    Ok(path)
}
