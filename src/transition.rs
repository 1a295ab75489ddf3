use crate::fs_ops::{
    copy_recursive, ensure_parent_dirs, move_path, path_exists, prune_empty_dirs, remove_copied,
};
use crate::manifest::ChangeRecord;
use crate::paths::ResolvedPaths;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("Failed to create parent directories of {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to remove empty directories above {path}: {source}")]
    Prune {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Moves one record's file between the staging, live and backup trees.
///
/// An upgrade is `backup` followed by `apply_upgrade`; `rollback` undoes both.
/// With `dry_run` set every step only logs what it would have done.
#[derive(Debug, Clone, Copy)]
pub struct Transitioner {
    pub dir_mode: u32,
    pub dry_run: bool,
}

impl Transitioner {
    /// Move the live file into the backup tree if the record deletes or
    /// modifies it.
    ///
    /// Nothing happens when the live file is already absent.
    pub fn backup(
        &self,
        record: &ChangeRecord,
        live: &Path,
        backup: &Path,
    ) -> Result<(), TransitionError> {
        if !record.action.is_some_and(|a| a.includes_delete()) {
            return Ok(());
        }
        if !path_exists(live) {
            debug!("{} does not exist, nothing to back up", live.display());
            return Ok(());
        }

        if self.dry_run {
            info!("Would back up {} to {}", live.display(), backup.display());
            return Ok(());
        }

        self.create_parents(backup)?;
        move_path(live, backup).map_err(|source| TransitionError::Move {
            from: live.to_path_buf(),
            to: backup.to_path_buf(),
            source,
        })?;
        info!("Backed up {} to {}", live.display(), backup.display());
        Ok(())
    }

    /// Copy the staged file over the live one if the record adds or modifies
    /// it.
    pub fn apply_upgrade(
        &self,
        record: &ChangeRecord,
        staging: &Path,
        live: &Path,
    ) -> Result<(), TransitionError> {
        if !record.action.is_some_and(|a| a.includes_add()) {
            return Ok(());
        }

        if self.dry_run {
            info!("Would copy {} to {}", staging.display(), live.display());
            return Ok(());
        }

        self.create_parents(live)?;
        copy_recursive(staging, live).map_err(|source| TransitionError::Copy {
            from: staging.to_path_buf(),
            to: live.to_path_buf(),
            source,
        })?;
        info!("Installed {} from {}", live.display(), staging.display());
        Ok(())
    }

    /// Undo an upgrade of this record.
    ///
    /// What the upgrade copied in is removed from the live tree, and a backed
    /// up file is moved back. Directories the upgrade created, in the live
    /// tree or the backup tree, are removed again once empty. The two steps
    /// run independently, so a modify record still gets its backup restored
    /// when removing the new file failed. All failures are returned.
    pub fn rollback(&self, record: &ChangeRecord, paths: &ResolvedPaths) -> Vec<TransitionError> {
        let Some(action) = record.action else {
            return Vec::new();
        };

        let mut failures = Vec::new();

        if action.includes_add()
            && let Err(e) = self.undo_add(paths)
        {
            failures.push(e);
        }

        if action.includes_delete()
            && let Err(e) = self.undo_delete(paths)
        {
            failures.push(e);
        }

        failures
    }

    fn undo_add(&self, paths: &ResolvedPaths) -> Result<(), TransitionError> {
        let live = &paths.live;
        if !path_exists(live) {
            debug!("{} does not exist, nothing to remove", live.display());
            return Ok(());
        }

        if self.dry_run {
            info!("Would remove {}", live.display());
            return Ok(());
        }

        remove_copied(&paths.staging, live).map_err(|source| TransitionError::Remove {
            path: live.to_path_buf(),
            source,
        })?;
        info!("Removed {}", live.display());

        prune_empty_dirs(&paths.live_parents).map_err(|source| TransitionError::Prune {
            path: live.to_path_buf(),
            source,
        })
    }

    fn undo_delete(&self, paths: &ResolvedPaths) -> Result<(), TransitionError> {
        let (live, backup) = (&paths.live, &paths.backup);
        if !path_exists(backup) {
            debug!("{} does not exist, nothing to restore", backup.display());
            return Ok(());
        }

        if self.dry_run {
            info!("Would restore {} to {}", backup.display(), live.display());
            return Ok(());
        }

        self.create_parents(live)?;
        move_path(backup, live).map_err(|source| TransitionError::Move {
            from: backup.to_path_buf(),
            to: live.to_path_buf(),
            source,
        })?;
        info!("Restored {} from {}", live.display(), backup.display());

        prune_empty_dirs(&paths.backup_parents).map_err(|source| TransitionError::Prune {
            path: backup.to_path_buf(),
            source,
        })
    }

    fn create_parents(&self, path: &Path) -> Result<(), TransitionError> {
        ensure_parent_dirs(path, self.dir_mode).map_err(|source| TransitionError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::manifest::Action;
    use std::fs;
    use tempfile::TempDir;

    const ENGINE: Transitioner = Transitioner {
        dir_mode: 0o751,
        dry_run: false,
    };

    const DRY_RUN: Transitioner = Transitioner {
        dir_mode: 0o751,
        dry_run: true,
    };

    fn record(action: Option<Action>) -> ChangeRecord {
        ChangeRecord {
            relative_path: "conf/app.conf".to_string(),
            action,
            ..Default::default()
        }
    }

    struct Trees {
        temp: TempDir,
        staging: PathBuf,
        live: PathBuf,
        backup: PathBuf,
        paths: ResolvedPaths,
    }

    fn trees_for(relative_path: &str) -> Trees {
        let temp = TempDir::new().unwrap();
        let root = temp.path().display().to_string();
        let config = Config {
            staging_root: format!("{root}/upgrade/"),
            live_root: format!("{root}/waf/"),
            backup_root: format!("{root}/bak/"),
            ..Config::default()
        };
        let rec = ChangeRecord {
            relative_path: relative_path.to_string(),
            ..Default::default()
        };
        let paths = ResolvedPaths::resolve(&rec, &config).unwrap();
        Trees {
            temp,
            staging: paths.staging.clone(),
            live: paths.live.clone(),
            backup: paths.backup.clone(),
            paths,
        }
    }

    fn trees() -> Trees {
        trees_for("conf/app.conf")
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_backup_moves_live_file_for_delete() {
        let t = trees();
        write(&t.live, "live");

        ENGINE
            .backup(&record(Some(Action::Delete)), &t.live, &t.backup)
            .unwrap();

        assert!(!t.live.exists());
        assert_eq!(fs::read_to_string(&t.backup).unwrap(), "live");
    }

    #[test]
    fn test_backup_skips_add() {
        let t = trees();
        write(&t.live, "live");

        ENGINE
            .backup(&record(Some(Action::Add)), &t.live, &t.backup)
            .unwrap();

        assert!(t.live.exists());
        assert!(!t.backup.exists());
    }

    #[test]
    fn test_backup_skips_missing_live_file() {
        let t = trees();

        ENGINE
            .backup(&record(Some(Action::Modify)), &t.live, &t.backup)
            .unwrap();

        assert!(!t.backup.exists());
        assert!(!t.backup.parent().unwrap().exists());
    }

    #[test]
    fn test_backup_reports_move_failure() {
        let t = trees();
        write(&t.live, "live");
        // A non-empty directory at the backup path makes the rename fail.
        write(&t.backup.join("occupied"), "x");

        let result = ENGINE.backup(&record(Some(Action::Delete)), &t.live, &t.backup);

        assert!(matches!(result, Err(TransitionError::Move { .. })));
        assert!(t.live.exists());
    }

    #[test]
    fn test_apply_copies_staged_file() {
        let t = trees();
        write(&t.staging, "staged");

        ENGINE
            .apply_upgrade(&record(Some(Action::Add)), &t.staging, &t.live)
            .unwrap();

        assert_eq!(fs::read_to_string(&t.live).unwrap(), "staged");
        assert!(t.staging.exists());
    }

    #[test]
    fn test_apply_skips_delete() {
        let t = trees();
        write(&t.staging, "staged");

        ENGINE
            .apply_upgrade(&record(Some(Action::Delete)), &t.staging, &t.live)
            .unwrap();

        assert!(!t.live.exists());
    }

    #[test]
    fn test_apply_reports_missing_staged_file() {
        let t = trees();

        let result = ENGINE.apply_upgrade(&record(Some(Action::Add)), &t.staging, &t.live);

        assert!(matches!(result, Err(TransitionError::Copy { .. })));
    }

    #[test]
    fn test_rollback_removes_added_file() {
        let t = trees();
        write(&t.live, "staged");

        let failures = ENGINE.rollback(&record(Some(Action::Add)), &t.paths);

        assert!(failures.is_empty());
        assert!(!t.live.exists());
    }

    #[test]
    fn test_rollback_restores_deleted_file() {
        let t = trees();
        write(&t.backup, "original");

        let failures = ENGINE.rollback(&record(Some(Action::Delete)), &t.paths);

        assert!(failures.is_empty());
        assert_eq!(fs::read_to_string(&t.live).unwrap(), "original");
        assert!(!t.backup.exists());
    }

    #[test]
    fn test_rollback_delete_keeps_live_file_without_backup() {
        let t = trees();
        write(&t.live, "live");

        let failures = ENGINE.rollback(&record(Some(Action::Delete)), &t.paths);

        assert!(failures.is_empty());
        assert_eq!(fs::read_to_string(&t.live).unwrap(), "live");
    }

    #[test]
    fn test_modify_round_trip() {
        let t = trees();
        write(&t.live, "original");
        write(&t.staging, "replacement");
        let rec = record(Some(Action::Modify));

        ENGINE.backup(&rec, &t.live, &t.backup).unwrap();
        ENGINE.apply_upgrade(&rec, &t.staging, &t.live).unwrap();
        assert_eq!(fs::read_to_string(&t.live).unwrap(), "replacement");
        assert_eq!(fs::read_to_string(&t.backup).unwrap(), "original");

        let failures = ENGINE.rollback(&rec, &t.paths);
        assert!(failures.is_empty());
        assert_eq!(fs::read_to_string(&t.live).unwrap(), "original");
        assert!(!t.backup.exists());
    }

    #[test]
    fn test_rollback_steps_are_independent() {
        let t = trees();
        // A directory at the live path with nothing staged to compare it
        // against cannot be removed, and blocks the restore as well.
        write(&t.live.join("unrelated.conf"), "unrelated");
        write(&t.backup, "original");

        let failures = ENGINE.rollback(&record(Some(Action::Modify)), &t.paths);

        assert_eq!(failures.len(), 2);
        assert!(matches!(failures[0], TransitionError::Remove { .. }));
        assert!(matches!(failures[1], TransitionError::Move { .. }));
        assert!(t.live.join("unrelated.conf").exists());
        assert_eq!(fs::read_to_string(&t.backup).unwrap(), "original");
    }

    #[test]
    fn test_rollback_of_directory_add_keeps_existing_entries() {
        let t = trees_for("conf.d");
        write(&t.staging.join("new.conf"), "new");
        write(&t.live.join("site.conf"), "site");
        let rec = ChangeRecord {
            relative_path: "conf.d".to_string(),
            action: Some(Action::Add),
            ..Default::default()
        };

        ENGINE.apply_upgrade(&rec, &t.staging, &t.live).unwrap();
        assert!(t.live.join("new.conf").exists());

        let failures = ENGINE.rollback(&rec, &t.paths);

        assert!(failures.is_empty());
        assert_eq!(fs::read_to_string(t.live.join("site.conf")).unwrap(), "site");
        assert!(!t.live.join("new.conf").exists());
    }

    #[test]
    fn test_rollback_removes_directories_created_by_upgrade() {
        let t = trees_for("plugins/new/tool");
        write(&t.staging, "tool");
        fs::create_dir_all(t.temp.path().join("waf")).unwrap();
        let rec = ChangeRecord {
            relative_path: "plugins/new/tool".to_string(),
            action: Some(Action::Add),
            ..Default::default()
        };

        ENGINE.apply_upgrade(&rec, &t.staging, &t.live).unwrap();
        assert!(t.live.exists());

        let failures = ENGINE.rollback(&rec, &t.paths);

        assert!(failures.is_empty());
        assert!(!t.temp.path().join("waf/plugins").exists());
        assert!(t.temp.path().join("waf").exists());
    }

    #[test]
    fn test_rollback_keeps_directories_with_other_content() {
        let t = trees_for("plugins/new/tool");
        write(&t.staging, "tool");
        write(&t.temp.path().join("waf/plugins/other"), "other");
        let rec = ChangeRecord {
            relative_path: "plugins/new/tool".to_string(),
            action: Some(Action::Add),
            ..Default::default()
        };

        ENGINE.apply_upgrade(&rec, &t.staging, &t.live).unwrap();
        assert!(ENGINE.rollback(&rec, &t.paths).is_empty());

        assert!(!t.temp.path().join("waf/plugins/new").exists());
        assert!(t.temp.path().join("waf/plugins/other").exists());
    }

    #[test]
    fn test_inert_record_touches_nothing() {
        let t = trees();
        write(&t.staging, "staged");
        write(&t.live, "live");
        write(&t.backup, "backup");
        let rec = record(None);

        ENGINE.backup(&rec, &t.live, &t.backup).unwrap();
        ENGINE.apply_upgrade(&rec, &t.staging, &t.live).unwrap();
        assert!(ENGINE.rollback(&rec, &t.paths).is_empty());

        assert_eq!(fs::read_to_string(&t.staging).unwrap(), "staged");
        assert_eq!(fs::read_to_string(&t.live).unwrap(), "live");
        assert_eq!(fs::read_to_string(&t.backup).unwrap(), "backup");
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let t = trees();
        write(&t.staging, "staged");
        write(&t.live, "live");
        let rec = record(Some(Action::Modify));

        DRY_RUN.backup(&rec, &t.live, &t.backup).unwrap();
        DRY_RUN.apply_upgrade(&rec, &t.staging, &t.live).unwrap();

        assert_eq!(fs::read_to_string(&t.live).unwrap(), "live");
        assert!(!t.backup.exists());

        write(&t.backup, "backup");
        assert!(DRY_RUN.rollback(&rec, &t.paths).is_empty());
        assert_eq!(fs::read_to_string(&t.live).unwrap(), "live");
        assert!(t.backup.exists());
    }
}
