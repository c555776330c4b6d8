/// Filesystem mutations for organizing files into bucket folders.
///
/// The executor creates bucket folders and moves files into them. Every
/// mutation it performs is appended to the destination's [`OperationLog`]
/// before control returns to the caller; if that append fails, the mutation
/// is rolled back and the error is reported instead.
use std::fs::{self, File, Metadata, OpenOptions};
use std::io;
use std::path::Path;

use crate::error::{OrganizeError, Result};
use crate::operation_log::{Mutation, OperationLog, OperationLogEntry, ensure_loggable};

/// Performs folder creation and file moves, recording each one.
pub struct OperationExecutor<'a> {
    log: &'a OperationLog,
}

impl<'a> OperationExecutor<'a> {
    /// Creates an executor that records into `log`.
    pub fn new(log: &'a OperationLog) -> Self {
        Self { log }
    }

    /// Creates the folder at `path` if it is absent.
    ///
    /// Returns `Some(entry)` when the folder was created and logged, and `None`
    /// when it already existed. Losing a creation race to another process is
    /// treated as "already existed".
    ///
    /// # Errors
    ///
    /// * `Conflict` if a non-directory occupies `path`
    /// * `UnsupportedName` if the path cannot be logged
    /// * the log append error, after the new folder has been removed again
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use photo_organizer::executor::OperationExecutor;
    /// use photo_organizer::operation_log::OperationLog;
    /// use std::path::Path;
    ///
    /// let log = OperationLog::open(Path::new("/path/to/dest"));
    /// let executor = OperationExecutor::new(&log);
    /// match executor.ensure_folder(Path::new("/path/to/dest/2024-01-02")) {
    ///     Ok(Some(entry)) => println!("{}", entry),
    ///     Ok(None) => println!("Folder already there"),
    ///     Err(e) => eprintln!("Could not create folder: {}", e),
    /// }
    /// ```
    pub fn ensure_folder(&self, path: &Path) -> Result<Option<OperationLogEntry>> {
        ensure_loggable(path)?;

        match fs::create_dir(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return if path.is_dir() {
                    tracing::debug!(path = %path.display(), "Folder already exists");
                    Ok(None)
                } else {
                    Err(OrganizeError::Conflict {
                        path: path.to_path_buf(),
                    })
                };
            }
            Err(e) => return Err(OrganizeError::from_io(path, e)),
        }

        match self.log.append(Mutation::DirectoryCreated {
            path: path.to_path_buf(),
        }) {
            Ok(entry) => {
                tracing::info!(path = %path.display(), "Created folder");
                Ok(Some(entry))
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Log append failed, removing new folder");
                if let Err(rollback) = fs::remove_dir(path) {
                    tracing::error!(path = %path.display(), error = %rollback, "Could not remove folder after failed log append");
                }
                Err(e)
            }
        }
    }

    /// Moves the file at `src` to `dst` and records the move.
    ///
    /// An existing entry at `dst` is never overwritten: the move fails with
    /// `Conflict` and the caller decides whether to carry on with other files.
    ///
    /// # Errors
    ///
    /// * `Conflict` if `dst` already exists
    /// * `PathNotFound` if `src` or the parent of `dst` is missing
    /// * the log append error, after the file has been moved back to `src`
    pub fn move_file(&self, src: &Path, dst: &Path) -> Result<OperationLogEntry> {
        ensure_loggable(src)?;
        ensure_loggable(dst)?;
        // Undo may run from another working directory.
        let original = std::path::absolute(src).map_err(|e| OrganizeError::from_io(src, e))?;

        relocate(src, dst)?;

        match self.log.append(Mutation::FileMoved {
            path: dst.to_path_buf(),
            original,
        }) {
            Ok(entry) => {
                tracing::info!(src = %src.display(), dst = %dst.display(), "Moved file");
                Ok(entry)
            }
            Err(e) => {
                tracing::warn!(src = %src.display(), error = %e, "Log append failed, moving file back");
                if let Err(rollback) = relocate(dst, src) {
                    tracing::error!(src = %src.display(), dst = %dst.display(), error = %rollback, "Could not move file back after failed log append");
                }
                Err(e)
            }
        }
    }
}

/// Moves a single file without recording anything.
///
/// Prefers an atomic rename; when `src` and `dst` live on different volumes it
/// copies, verifies the copied size and only then deletes the source.
pub fn relocate(src: &Path, dst: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(src).map_err(|e| OrganizeError::from_io(src, e))?;

    if fs::symlink_metadata(dst).is_ok() {
        return Err(OrganizeError::Conflict {
            path: dst.to_path_buf(),
        });
    }

    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty())
        && !parent.is_dir()
    {
        return Err(OrganizeError::PathNotFound {
            path: parent.to_path_buf(),
        });
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(src = %src.display(), dst = %dst.display(), "Rename crosses devices, copying instead");
            copy_then_remove(src, dst, &metadata)
        }
        Err(e) => Err(OrganizeError::from_io(src, e)),
    }
}

fn copy_then_remove(src: &Path, dst: &Path, metadata: &Metadata) -> Result<()> {
    let mut reader = File::open(src).map_err(|e| OrganizeError::from_io(src, e))?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dst)
        .map_err(|e| OrganizeError::from_io(dst, e))?;

    let copied = io::copy(&mut reader, &mut writer)
        .and_then(|copied| writer.sync_all().map(|()| copied))
        .map_err(|e| OrganizeError::from_io(dst, e))
        .and_then(|copied| {
            if copied == metadata.len() {
                Ok(())
            } else {
                Err(OrganizeError::Io {
                    path: dst.to_path_buf(),
                    source: io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("copied {} of {} bytes", copied, metadata.len()),
                    ),
                })
            }
        });
    drop(writer);

    if let Err(e) = copied {
        let _ = fs::remove_file(dst);
        return Err(e);
    }

    if let Err(e) = fs::set_permissions(dst, metadata.permissions()) {
        tracing::debug!(dst = %dst.display(), error = %e, "Could not copy permissions");
    }

    if let Err(e) = fs::remove_file(src) {
        // Keep exactly one copy.
        let _ = fs::remove_file(dst);
        return Err(OrganizeError::from_io(src, e));
    }

    Ok(())
}
