//! Writing the finished summary.
//!
//! The summary is written to a temporary file next to the destination and
//! renamed into place, so the destination is either untouched or holds the
//! complete summary. An existing file is replaced only at that point.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::OutputError;

/// Write `text` to `path`, replacing any existing file.
pub async fn write_summary(path: &Path, text: &str) -> Result<(), OutputError> {
    let err = |source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(err)?;
    }

    let temp = temp_path(path);
    if let Err(e) = tokio::fs::write(&temp, text).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(err(e));
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(err(e));
    }

    debug!("Wrote {} bytes to {}", text.len(), path.display());
    Ok(())
}

/// Sibling path used while writing, e.g. `summary.txt` -> `.summary.txt.tmp-1234`.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "summary".to_string());
    path.with_file_name(format!(".{name}.tmp-{}", std::process::id()))
}
