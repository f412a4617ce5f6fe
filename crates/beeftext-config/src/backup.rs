//! Combo list backups

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::ComboListError;

/// Number of backups kept in the backup folder.
pub const MAX_BACKUPS: usize = 10;

const PREFIX: &str = "comboList-";
const SUFFIX: &str = ".json";

/// Copy `source` into `folder` under a timestamped name, then prune old
/// backups. Returns the backup path, or `None` when there was nothing to copy.
pub fn backup_combo_list(source: &Path, folder: &Path) -> Result<Option<PathBuf>, ComboListError> {
    if !source.exists() {
        return Ok(None);
    }

    std::fs::create_dir_all(folder).map_err(|e| ComboListError::io(folder, e))?;

    let stamp = Local::now().format("%Y%m%d-%H%M%S%.3f");
    let mut target = folder.join(format!("{}{}{}", PREFIX, stamp, SUFFIX));
    let mut n = 1;
    while target.exists() {
        target = folder.join(format!("{}{}-{}{}", PREFIX, stamp, n, SUFFIX));
        n += 1;
    }

    std::fs::copy(source, &target).map_err(|e| ComboListError::io(&target, e))?;
    tracing::debug!("Backed up combo list to {}", target.display());

    prune_backups(folder, MAX_BACKUPS)?;
    Ok(Some(target))
}

/// Backup files in `folder`, oldest first.
pub fn list_backups(folder: &Path) -> Result<Vec<PathBuf>, ComboListError> {
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ComboListError::io(folder, e)),
    };

    let mut backups: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(PREFIX) && n.ends_with(SUFFIX))
        })
        .collect();
    // Timestamps sort lexically
    backups.sort();
    Ok(backups)
}

fn prune_backups(folder: &Path, keep: usize) -> Result<(), ComboListError> {
    let backups = list_backups(folder)?;
    let excess = backups.len().saturating_sub(keep);
    for old in &backups[..excess] {
        if let Err(e) = std::fs::remove_file(old) {
            tracing::warn!("Could not remove old backup {}: {}", old.display(), e);
        }
    }
    Ok(())
}
