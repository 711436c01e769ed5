use std::path::Path;

use crate::errors::Result;
use crate::utils::file::{collect_files, copy_dir_recursive, hide_path};

pub const BACKUP_DIR_NAME: &str = ".langpack-backup";

/// Snapshot the files in `target_dir` that `source_tree` is about to
/// overwrite.
///
/// Runs at most once per target directory: an existing backup holds the
/// original, pre-any-translation files and must survive re-installs, so a
/// second call returns without touching it. Files the install adds (no
/// counterpart in the target yet) are not mirrored.
pub fn backup(source_tree: &Path, target_dir: &Path) -> Result<u32> {
    let backup_dir = target_dir.join(BACKUP_DIR_NAME);
    if backup_dir.exists() {
        tracing::info!(
            "backup already present at {}, keeping original snapshot",
            backup_dir.display()
        );
        return Ok(0);
    }

    std::fs::create_dir_all(&backup_dir)?;
    hide_path(&backup_dir);

    let mut backed_up = 0u32;
    for relative in collect_files(source_tree)? {
        let target_path = target_dir.join(&relative);
        if !target_path.is_file() {
            continue;
        }
        let backup_path = backup_dir.join(&relative);
        if let Some(parent) = backup_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&target_path, &backup_path)?;
        backed_up += 1;
    }

    tracing::info!("backed up {} files into {}", backed_up, backup_dir.display());
    Ok(backed_up)
}

/// Copy every entry of the backup tree back over the target directory.
/// The caller removes the backup tree after a full restore.
pub fn restore(backup_dir: &Path, target_dir: &Path) -> Result<u32> {
    let restored = copy_dir_recursive(backup_dir, target_dir)?;
    tracing::info!("restored {} files into {}", restored, target_dir.display());
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn backs_up_only_files_that_would_be_overwritten() {
        let staging = tempdir().unwrap();
        let target = tempdir().unwrap();

        fs::write(staging.path().join("data.txt"), b"new").unwrap();
        fs::write(staging.path().join("fresh.txt"), b"new file").unwrap();
        fs::write(target.path().join("data.txt"), b"original").unwrap();

        let count = backup(staging.path(), target.path()).unwrap();

        assert_eq!(count, 1);
        let backup_dir = target.path().join(BACKUP_DIR_NAME);
        assert_eq!(fs::read(backup_dir.join("data.txt")).unwrap(), b"original");
        assert!(!backup_dir.join("fresh.txt").exists());
    }

    #[test]
    fn second_backup_is_a_no_op() {
        let staging = tempdir().unwrap();
        let target = tempdir().unwrap();

        fs::write(staging.path().join("data.txt"), b"v1").unwrap();
        fs::write(target.path().join("data.txt"), b"original").unwrap();
        backup(staging.path(), target.path()).unwrap();

        // Simulate the installed translation, then a re-install.
        fs::write(target.path().join("data.txt"), b"v1").unwrap();
        let count = backup(staging.path(), target.path()).unwrap();

        assert_eq!(count, 0);
        let preserved = fs::read(target.path().join(BACKUP_DIR_NAME).join("data.txt")).unwrap();
        assert_eq!(preserved, b"original");
    }

    #[test]
    fn restore_replays_the_backup_tree() {
        let staging = tempdir().unwrap();
        let target = tempdir().unwrap();

        fs::create_dir_all(staging.path().join("locale")).unwrap();
        fs::write(staging.path().join("locale/strings.pak"), b"translated").unwrap();
        fs::create_dir_all(target.path().join("locale")).unwrap();
        fs::write(target.path().join("locale/strings.pak"), b"original").unwrap();

        backup(staging.path(), target.path()).unwrap();
        fs::write(target.path().join("locale/strings.pak"), b"translated").unwrap();

        let backup_dir = target.path().join(BACKUP_DIR_NAME);
        let restored = restore(&backup_dir, target.path()).unwrap();

        assert_eq!(restored, 1);
        assert_eq!(
            fs::read(target.path().join("locale/strings.pak")).unwrap(),
            b"original"
        );
    }
}
