//! Disk writes for the local mirror.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `bytes` to `path` via a temporary sibling and a rename, so readers
/// never observe a partially written file. Creates parent directories.
///
/// The write runs to completion on the blocking pool even if the returned
/// future is dropped; the temporary file is removed whenever the rename
/// does not happen.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let path = path.to_path_buf();
    let bytes = bytes.to_vec();

    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &bytes))
        .await
        .map_err(std::io::Error::other)?
}

fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".mirror")
        .suffix(".tmp")
        .tempfile_in(&parent)?;
    temp.write_all(bytes)?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// True if something exists at `path`. Errors count as absent.
pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
