//! Filesystem primitives used by the upgrade and rollback steps.
//!
//! These return plain `std::io::Result`; callers attach the paths involved.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Create every missing ancestor directory of `path`.
///
/// The last component of `path` is taken to be a file name and is not
/// created. Existing directories are left alone, so calling this repeatedly is
/// harmless. On Unix new directories get `mode` (subject to the umask).
pub fn ensure_parent_dirs(path: &Path, mode: u32) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    builder.create(parent)
}

/// True if something exists at `path`. A dangling symlink counts.
pub fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Move `from` to `to` with a single rename.
///
/// There is no copy fallback, so moving across filesystems fails.
pub fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    debug!("Renaming {} to {}", from.display(), to.display());
    fs::rename(from, to)
}

/// Undo `copy_recursive(staged, target)`.
///
/// A file or symlink at `target` is removed. A directory at `target` may hold
/// entries that were there before the copy, so only the entries present under
/// `staged` are removed, and each directory is removed once it is empty. A
/// directory at `target` with no staged directory to compare against is left
/// alone and reported as an error.
pub fn remove_copied(staged: &Path, target: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(target)?;
    if !metadata.file_type().is_dir() {
        debug!("Removing {}", target.display());
        return fs::remove_file(target);
    }

    let staged_is_dir = fs::symlink_metadata(staged)
        .map(|m| m.file_type().is_dir())
        .unwrap_or(false);
    if !staged_is_dir {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "{} is a directory but {} is not, cannot tell which entries to remove",
                target.display(),
                staged.display()
            ),
        ));
    }

    for entry in fs::read_dir(staged)? {
        let entry = entry?;
        let child = target.join(entry.file_name());
        if path_exists(&child) {
            remove_copied(&entry.path(), &child)?;
        }
    }

    if fs::read_dir(target)?.next().is_none() {
        debug!("Removing empty directory {}", target.display());
        fs::remove_dir(target)?;
    }
    Ok(())
}

/// Remove each directory in `dirs`, deepest first, stopping at the first one
/// that is missing or not empty.
pub fn prune_empty_dirs(dirs: &[PathBuf]) -> io::Result<()> {
    for dir in dirs {
        match fs::read_dir(dir) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(e),
        }
        debug!("Removing empty directory {}", dir.display());
        fs::remove_dir(dir)?;
    }
    Ok(())
}

/// Copy `from` to `to`, overwriting what is already there.
///
/// Directories are merged into `to` recursively. Symlinks are recreated
/// rather than followed on Unix.
pub fn copy_recursive(from: &Path, to: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(from)?;
    let file_type = metadata.file_type();

    if file_type.is_symlink() {
        copy_symlink(from, to)
    } else if file_type.is_dir() {
        match fs::symlink_metadata(to) {
            Ok(existing) if existing.file_type().is_dir() => {}
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a directory", to.display()),
                ));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir(to)?,
            Err(e) => return Err(e),
        }

        for entry in fs::read_dir(from)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        // fs::copy would write through a symlink at the destination.
        if let Ok(existing) = fs::symlink_metadata(to)
            && existing.file_type().is_symlink()
        {
            fs::remove_file(to)?;
        }
        debug!("Copying {} to {}", from.display(), to.display());
        fs::copy(from, to)?;
        Ok(())
    }
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let target = fs::read_link(from)?;
    if let Ok(existing) = fs::symlink_metadata(to) {
        if existing.file_type().is_dir() {
            fs::remove_dir_all(to)?;
        } else {
            fs::remove_file(to)?;
        }
    }
    std::os::unix::fs::symlink(target, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to).map(|_| ())
}
