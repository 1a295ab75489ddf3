use crate::config::Config;
use crate::manifest::{Manifest, ManifestError};
use crate::paths::ResolvedPaths;
use crate::transition::Transitioner;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{Level, debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("Unknown task: {0} (expected check, upgrade or rollback)")]
    UnknownTask(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Decode the manifest and resolve paths without touching any file.
    Check,
    Upgrade,
    Rollback,
}

impl FromStr for Task {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check" => Ok(Task::Check),
            "upgrade" => Ok(Task::Upgrade),
            "rollback" => Ok(Task::Rollback),
            other => Err(TaskError::UnknownTask(other.to_string())),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Task::Check => "check",
            Task::Upgrade => "upgrade",
            Task::Rollback => "rollback",
        })
    }
}

pub struct TaskOptions {
    pub dry_run: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub records: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Records without a recognized action.
    pub skipped: usize,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Run `task` over every record of the manifest at `manifest_path`.
///
/// The manifest is decoded up front and a decode failure aborts the run
/// before any file is touched. After that each record is handled on its
/// own: a record whose paths cannot be resolved, or whose file operations
/// fail, is logged and counted in [`RunReport::failed`], and the remaining
/// records are still processed in manifest order.
pub fn run(
    manifest_path: &Path,
    task: Task,
    config: &Config,
    options: TaskOptions,
) -> Result<RunReport, TaskError> {
    let manifest = Manifest::load(
        manifest_path,
        config.max_record_count,
        config.overflow,
    )?;
    info!(
        "Loaded {} record(s) from {}",
        manifest.records.len(),
        manifest_path.display()
    );
    if task == Task::Check && tracing::enabled!(Level::DEBUG) {
        let normalized = manifest.to_yaml()?;
        debug!("Normalized manifest:\n{}", normalized);
    }

    let engine = Transitioner {
        dir_mode: config.dir_mode,
        dry_run: options.dry_run,
    };

    let mut report = RunReport {
        records: manifest.records.len(),
        ..Default::default()
    };

    for record in &manifest.records {
        let paths = match ResolvedPaths::resolve(record, config) {
            Ok(paths) => paths,
            Err(e) => {
                error!("Skipping record {:?}: {}", record.relative_path, e);
                report.failed += 1;
                continue;
            }
        };

        let Some(action) = record.action else {
            debug!(
                "Record {:?} has no recognized action, leaving it alone",
                record.relative_path
            );
            report.skipped += 1;
            if task == Task::Check {
                println!("ok {}", record.relative_path);
            }
            continue;
        };
        debug!(
            "Record {:?} ({}, chmod {}): staging {}, live {}, backup {}",
            record.relative_path,
            action.as_str(),
            record.permission_mode,
            paths.staging.display(),
            paths.live.display(),
            paths.backup.display()
        );

        match task {
            Task::Check => {
                println!("ok {}", record.relative_path);
                report.succeeded += 1;
            }
            Task::Upgrade => {
                let result = engine
                    .backup(record, &paths.live, &paths.backup)
                    .and_then(|()| engine.apply_upgrade(record, &paths.staging, &paths.live));
                match result {
                    Ok(()) => report.succeeded += 1,
                    Err(e) => {
                        error!("Upgrade of {:?} failed: {}", record.relative_path, e);
                        report.failed += 1;
                    }
                }
            }
            Task::Rollback => {
                let failures = engine.rollback(record, &paths);
                for e in &failures {
                    error!("Rollback of {:?} failed: {}", record.relative_path, e);
                }
                if failures.is_empty() {
                    report.succeeded += 1;
                } else {
                    report.failed += 1;
                }
            }
        }
    }

    Ok(report)
}
