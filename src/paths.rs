use crate::config::Config;
use crate::manifest::ChangeRecord;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("Path too long ({len} bytes, limit {max}): {path}")]
    TooLong { path: String, len: usize, max: usize },
    #[error("Empty relative path")]
    Empty,
    #[error("Absolute relative path not allowed: {0}")]
    Absolute(String),
    #[error("Relative path escapes its base directory: {0}")]
    Traversal(String),
}

/// Join `base` and `relative` by plain concatenation.
///
/// No separator is inserted, so a base is expected to end in `/`. The joined
/// path must stay strictly shorter than `max_len - 1` bytes, i.e. with the
/// default of 256 a 254 byte path is accepted and a 255 byte one is not.
///
/// `relative` must be non-empty, must not start with a separator, and must not
/// contain a `..` segment.
pub fn resolve(base: &str, relative: &str, max_len: usize) -> Result<PathBuf, PathError> {
    check_relative(relative)?;

    let joined = format!("{base}{relative}");
    let limit = max_len.saturating_sub(1);
    if joined.len() >= limit {
        return Err(PathError::TooLong {
            len: joined.len(),
            path: joined,
            max: limit,
        });
    }

    Ok(PathBuf::from(joined))
}

fn check_relative(relative: &str) -> Result<(), PathError> {
    if relative.is_empty() {
        return Err(PathError::Empty);
    }

    if relative.starts_with('/') || relative.starts_with('\\') {
        return Err(PathError::Absolute(relative.to_string()));
    }

    if relative.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(PathError::Traversal(relative.to_string()));
    }

    Ok(())
}

/// The three locations one record moves a file between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub staging: PathBuf,
    pub live: PathBuf,
    pub backup: PathBuf,
    /// Directories between the live root and `live`, deepest first.
    pub live_parents: Vec<PathBuf>,
    /// Directories between the backup root and `backup`, deepest first.
    pub backup_parents: Vec<PathBuf>,
}

impl ResolvedPaths {
    pub fn resolve(record: &ChangeRecord, config: &Config) -> Result<Self, PathError> {
        let max = config.max_path_length;
        let live_base = record.live_base.as_deref().unwrap_or(&config.live_root);

        Ok(ResolvedPaths {
            backup: resolve(&config.backup_root, &record.relative_path, max)?,
            live: resolve(live_base, &record.relative_path, max)?,
            staging: resolve(&config.staging_root, &record.relative_path, max)?,
            live_parents: parent_dirs(live_base, &record.relative_path),
            backup_parents: parent_dirs(&config.backup_root, &record.relative_path),
        })
    }
}

/// `base` joined with each proper ancestor of `relative`, deepest first.
///
/// `base` itself is never included. Only call this once `relative` has
/// passed `resolve`.
fn parent_dirs(base: &str, relative: &str) -> Vec<PathBuf> {
    Path::new(relative)
        .ancestors()
        .skip(1)
        .filter(|ancestor| {
            matches!(
                ancestor.components().next_back(),
                Some(Component::Normal(_))
            )
        })
        .map(|ancestor| PathBuf::from(format!("{base}{}", ancestor.to_string_lossy())))
        .collect()
}
