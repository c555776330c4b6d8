/// Undo functionality for reversing the most recent logged mutation.
///
/// Undo is strictly LIFO and one step at a time: each call looks at the last
/// entry of the destination's operation log, reverses it on disk, and only
/// then pops the entry. There is no redo.
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{LogCorruptError, OrganizeError, Result};
use crate::executor::relocate;
use crate::operation_log::{EntryKind, LogGuard, OperationLog, OperationLogEntry};

/// What a successful undo did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UndoOutcome {
    /// A moved file went back to its original location.
    Restored {
        entry: OperationLogEntry,
        restored_to: PathBuf,
    },
    /// An empty folder created by the engine was removed.
    Removed { entry: OperationLogEntry },
    /// The folder was already gone; the entry was popped anyway.
    AlreadyGone { entry: OperationLogEntry },
    /// The log is empty or missing.
    NothingToUndo,
}

impl UndoOutcome {
    /// The entry this undo consumed, if any.
    pub fn entry(&self) -> Option<&OperationLogEntry> {
        match self {
            Self::Restored { entry, .. } | Self::Removed { entry } | Self::AlreadyGone { entry } => {
                Some(entry)
            }
            Self::NothingToUndo => None,
        }
    }

    /// Returns true if this outcome should be surfaced as a warning.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::AlreadyGone { .. })
    }
}

/// Result of a single undo step.
///
/// Refusals (`NotEmpty`, `NotFound`, `Conflict`, ...) come back as errors and
/// leave the log untouched.
pub type UndoResult = Result<UndoOutcome>;

/// Reverses logged mutations.
pub struct UndoEngine;

impl UndoEngine {
    /// Undoes the most recent entry in `destination`'s operation log.
    ///
    /// The filesystem is changed first and the log entry is removed only once
    /// that succeeded. If removing the entry then fails, the reversal is
    /// re-applied so that disk and log keep agreeing.
    ///
    /// # Edge Cases Handled
    ///
    /// * **Folder gained content**: `NotEmpty`, log unchanged
    /// * **Folder already removed**: entry popped, `AlreadyGone` warning
    /// * **File missing from its logged location**: `NotFound`, log unchanged
    /// * **Original location occupied**: `Conflict`, log unchanged
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use photo_organizer::undo::UndoEngine;
    /// use std::path::Path;
    ///
    /// match UndoEngine::undo_last(Path::new("/path/to/dest")) {
    ///     Ok(outcome) => println!("{:?}", outcome),
    ///     Err(e) => eprintln!("Undo failed: {}", e),
    /// }
    /// ```
    pub fn undo_last(destination: &Path) -> UndoResult {
        if !destination.is_dir() {
            return Err(OrganizeError::PathNotFound {
                path: destination.to_path_buf(),
            });
        }

        let log = OperationLog::open(destination);
        let mut guard = log.lock();

        let Some(entry) = guard.read_last()? else {
            return Ok(UndoOutcome::NothingToUndo);
        };

        match entry.kind {
            EntryKind::DirectoryCreated => Self::undo_directory(&mut guard, destination, entry),
            EntryKind::FileMoved => Self::undo_move(&mut guard, destination, entry),
        }
    }

    fn undo_directory(
        guard: &mut LogGuard<'_>,
        destination: &Path,
        entry: OperationLogEntry,
    ) -> UndoResult {
        let path = entry.resolve(destination);

        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                guard.remove_last()?;
                tracing::warn!(path = %path.display(), "Folder already gone, dropped its log entry");
                return Ok(UndoOutcome::AlreadyGone { entry });
            }
            Err(e) => return Err(OrganizeError::from_io(&path, e)),
        };

        if !metadata.is_dir() {
            return Err(OrganizeError::Conflict { path });
        }

        let mut contents = fs::read_dir(&path).map_err(|e| OrganizeError::from_io(&path, e))?;
        if contents.next().is_some() {
            return Err(OrganizeError::NotEmpty { path });
        }

        fs::remove_dir(&path).map_err(|e| match e.kind() {
            io::ErrorKind::DirectoryNotEmpty => OrganizeError::NotEmpty { path: path.clone() },
            _ => OrganizeError::from_io(&path, e),
        })?;

        if let Err(e) = guard.remove_last() {
            tracing::warn!(path = %path.display(), error = %e, "Could not pop log entry, recreating folder");
            if let Err(rollback) = fs::create_dir(&path) {
                tracing::error!(path = %path.display(), error = %rollback, "Could not recreate folder after failed log update");
            }
            return Err(e);
        }

        tracing::info!(path = %path.display(), "Removed folder");
        Ok(UndoOutcome::Removed { entry })
    }

    fn undo_move(
        guard: &mut LogGuard<'_>,
        destination: &Path,
        entry: OperationLogEntry,
    ) -> UndoResult {
        let current = entry.resolve(destination);
        let Some(original) = entry.original_path.clone() else {
            return Err(LogCorruptError {
                log_path: guard.path().to_path_buf(),
                line_number: entry.sequence as usize,
                reason: "moved file has no recorded origin".to_string(),
                entries: Vec::new(),
            }
            .into());
        };

        match fs::symlink_metadata(&current) {
            Ok(metadata) if !metadata.is_dir() => {}
            Ok(_) => return Err(OrganizeError::NotFound { path: current }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(OrganizeError::NotFound { path: current });
            }
            Err(e) => return Err(OrganizeError::from_io(&current, e)),
        }

        relocate(&current, &original)?;

        if let Err(e) = guard.remove_last() {
            tracing::warn!(path = %original.display(), error = %e, "Could not pop log entry, moving file forward again");
            if let Err(rollback) = relocate(&original, &current) {
                tracing::error!(path = %original.display(), error = %rollback, "Could not re-apply move after failed log update");
            }
            return Err(e);
        }

        tracing::info!(from = %current.display(), to = %original.display(), "Restored file");
        Ok(UndoOutcome::Restored {
            entry,
            restored_to: original,
        })
    }
}
