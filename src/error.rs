//! Error taxonomy shared by the organize, undo and history operations.

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

use crate::operation_log::OperationLogEntry;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, OrganizeError>;

/// Errors that can occur while organizing, undoing or reading history.
#[derive(Debug, thiserror::Error)]
pub enum OrganizeError {
    /// A source or destination directory (or a file's parent) is missing.
    #[error("Path not found: {}", path.display())]
    PathNotFound { path: PathBuf },

    /// The filesystem refused access.
    #[error("Permission denied for {}: {source}", path.display())]
    Permission { path: PathBuf, source: io::Error },

    /// Something already occupies the destination name.
    #[error("An entry named {} already exists", path.display())]
    Conflict { path: PathBuf },

    #[error(transparent)]
    LogCorrupt(#[from] LogCorruptError),

    /// Undo refused to remove a folder that has gained content.
    #[error("Directory {} is not empty", path.display())]
    NotEmpty { path: PathBuf },

    /// Undo could not find the file at its logged location.
    #[error("File {} not found at its logged location", path.display())]
    NotFound { path: PathBuf },

    /// The name contains characters the operation log cannot record.
    #[error("Unsupported file name: {}", path.display())]
    UnsupportedName { path: PathBuf },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl OrganizeError {
    /// Classifies an I/O failure on `path` into the engine taxonomy.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        let path = path.to_path_buf();
        match err.kind() {
            io::ErrorKind::NotFound => Self::PathNotFound { path },
            io::ErrorKind::PermissionDenied => Self::Permission { path, source: err },
            io::ErrorKind::AlreadyExists => Self::Conflict { path },
            _ => Self::Io { path, source: err },
        }
    }

    /// Returns the coarse kind used in summaries.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PathNotFound { .. } => ErrorKind::PathNotFound,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::LogCorrupt(_) => ErrorKind::LogCorrupt,
            Self::NotEmpty { .. } => ErrorKind::NotEmpty,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::UnsupportedName { .. } => ErrorKind::UnsupportedName,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Coarse error classification, cheap to copy into reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    PathNotFound,
    Permission,
    Conflict,
    LogCorrupt,
    NotEmpty,
    NotFound,
    UnsupportedName,
    Cancelled,
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PathNotFound => "path not found",
            Self::Permission => "permission denied",
            Self::Conflict => "conflict",
            Self::LogCorrupt => "log corrupt",
            Self::NotEmpty => "not empty",
            Self::NotFound => "not found",
            Self::UnsupportedName => "unsupported name",
            Self::Cancelled => "cancelled",
            Self::Io => "i/o error",
        };
        f.write_str(name)
    }
}

/// The operation log contains a line that cannot be parsed.
///
/// Every entry that did parse is kept in `entries`, so callers can still show
/// history up to (and past) the damaged line.
#[derive(Debug, thiserror::Error)]
#[error("Operation log {} is corrupt at line {line_number}: {reason}", log_path.display())]
pub struct LogCorruptError {
    pub log_path: PathBuf,
    /// 1-based number of the first unparseable line.
    pub line_number: usize,
    pub reason: String,
    pub entries: Vec<OperationLogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_maps_kinds() {
        let path = Path::new("/tmp/x");
        let err = OrganizeError::from_io(path, io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.kind(), ErrorKind::PathNotFound);

        let err = OrganizeError::from_io(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.kind(), ErrorKind::Permission);

        let err = OrganizeError::from_io(path, io::Error::from(io::ErrorKind::AlreadyExists));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = OrganizeError::from_io(path, io::Error::other("disk on fire"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_conflict_message_names_path() {
        let err = OrganizeError::Conflict {
            path: PathBuf::from("2024-01-02/photo.jpg"),
        };
        assert!(err.to_string().contains("2024-01-02/photo.jpg"));
    }
}
