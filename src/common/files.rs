//! Backup-before-write file helpers.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Suffix of the one-time backup taken before the first modification.
pub const BACKUP_SUFFIX: &str = ".pre-fix";

/// Path of the backup for `path` (`/etc/fstab` -> `/etc/fstab.pre-fix`).
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Copy `path` to its `.pre-fix` backup unless that backup already exists.
///
/// Returns true if a backup was created by this call.
pub fn backup_once(path: &Path) -> Result<bool> {
    let backup = backup_path(path);
    if backup.exists() || !path.exists() {
        return Ok(false);
    }
    fs::copy(path, &backup)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup.display()))?;
    Ok(true)
}

/// Replace `path` atomically: write a sibling temp file, then rename it over.
///
/// Permissions of an existing file are carried over; new files get 0644.
pub fn write_atomic<C: AsRef<[u8]>>(path: &Path, content: C) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mode = fs::metadata(path)
        .map(|m| m.permissions().mode())
        .unwrap_or(0o644);

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(content.as_ref())?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Back up once, then write atomically if the content differs.
///
/// Returns true if the file was rewritten.
pub fn patch_file(path: &Path, new_content: &str) -> Result<bool> {
    let current = fs::read_to_string(path).unwrap_or_default();
    if current == new_content {
        return Ok(false);
    }
    backup_once(path)?;
    write_atomic(path, new_content)?;
    Ok(true)
}
