//! Small helpers shared by the transport, the store and the config loader.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Truncate to at most `max_chars` characters, appending "..." when cut.
///
/// Cuts on character boundaries, so multi-byte text never panics.
///
/// ```
/// use fastkeeper::util::truncate_with_ellipsis;
///
/// assert_eq!(truncate_with_ellipsis("upstream gone", 20), "upstream gone");
/// assert_eq!(truncate_with_ellipsis("upstream gone", 8), "upstream...");
/// ```
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", s[..idx].trim_end()),
        None => s.to_string(),
    }
}

/// Replace `path` with `contents` via a sibling temp file and a rename, so a
/// crash never leaves a half-written file behind. A previous version is kept as
/// `{name}.bak` until the rename succeeds.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent_dir = path
        .parent()
        .context("Target path must have a parent directory")?;
    fs::create_dir_all(parent_dir)
        .with_context(|| format!("Failed to create directory: {}", parent_dir.display()))?;

    let file_name = path
        .file_name()
        .and_then(|v| v.to_str())
        .context("Target path must have a UTF-8 file name")?;
    let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
    let backup_path = parent_dir.join(format!("{file_name}.bak"));

    let mut temp_file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temporary file: {}", temp_path.display()))?;
    temp_file
        .write_all(contents)
        .context("Failed to write temporary file contents")?;
    temp_file
        .sync_all()
        .context("Failed to fsync temporary file")?;
    drop(temp_file);

    let had_existing = path.exists();
    if had_existing {
        fs::copy(path, &backup_path).with_context(|| {
            format!("Failed to back up before replace: {}", backup_path.display())
        })?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        if had_existing && backup_path.exists() {
            let _ = fs::copy(&backup_path, path);
        }
        anyhow::bail!("Failed to replace {}: {e}", path.display());
    }

    sync_directory(parent_dir)?;

    if had_existing {
        let _ = fs::remove_file(&backup_path);
    }
    Ok(())
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> Result<()> {
    let dir = File::open(path)
        .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
    dir.sync_all()
        .with_context(|| format!("Failed to fsync directory: {}", path.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> Result<()> {
    Ok(())
}
