/// File classification for routing files into bucket folders.
///
/// A classification strategy maps a file's metadata to the name of the
/// destination subfolder (the *bucket key*). Classification never fails: files
/// without a usable creation date or extension land in a fixed sentinel bucket.
///
/// # Examples
///
/// ```
/// use photo_organizer::classifier::{ClassificationStrategy, FileEntry, classify};
/// use std::path::Path;
///
/// let entry = FileEntry::new(Path::new("/photos/IMG_0001.jpg"), None);
/// assert_eq!(classify(&entry, ClassificationStrategy::ByFileType), "JPG");
/// assert_eq!(classify(&entry, ClassificationStrategy::ByDate), "unknown");
/// ```
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Bucket for files whose creation date cannot be read.
pub const UNKNOWN_DATE_BUCKET: &str = "unknown";

/// Bucket for files without an extension.
pub const NO_EXTENSION_BUCKET: &str = "NOEXT";

/// Date format used for `ByDate` bucket keys.
pub const DATE_BUCKET_FORMAT: &str = "%Y-%m-%d";

/// Rule used to compute a file's bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassificationStrategy {
    /// Bucket by creation date, `yyyy-MM-dd` in local time.
    #[default]
    #[serde(alias = "date")]
    ByDate,
    /// Bucket by uppercased extension.
    #[serde(alias = "type", alias = "file-type")]
    ByFileType,
}

impl ClassificationStrategy {
    /// Returns a human-readable label for this strategy.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ByDate => "creation date",
            Self::ByFileType => "file type",
        }
    }
}

impl std::fmt::Display for ClassificationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ClassificationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" | "by-date" => Ok(Self::ByDate),
            "type" | "file-type" | "by-file-type" => Ok(Self::ByFileType),
            other => Err(format!(
                "unknown classification strategy '{other}' (expected 'date' or 'type')"
            )),
        }
    }
}

/// Read-only view of one file, constructed per scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path to the file.
    pub path: PathBuf,
    /// The file's base name.
    pub name: String,
    /// Extension without the leading dot, as found on disk.
    pub extension: Option<String>,
    /// Creation timestamp, when the platform and filesystem report one.
    pub created: Option<DateTime<Local>>,
}

impl FileEntry {
    /// Builds an entry from a path and an already known creation time.
    pub fn new(path: &Path, created: Option<DateTime<Local>>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .filter(|e| !e.is_empty());

        Self {
            path: path.to_path_buf(),
            name,
            extension,
            created,
        }
    }

    /// Reads metadata for `path` and builds an entry.
    ///
    /// The creation time is best-effort: on filesystems that do not record it
    /// the entry simply carries `None`.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = fs::symlink_metadata(path)?;
        let created = metadata.created().ok().map(DateTime::<Local>::from);
        Ok(Self::new(path, created))
    }
}

/// Computes the bucket key for `entry` under `strategy`.
pub fn classify(entry: &FileEntry, strategy: ClassificationStrategy) -> String {
    match strategy {
        ClassificationStrategy::ByDate => match entry.created {
            Some(created) => created.format(DATE_BUCKET_FORMAT).to_string(),
            None => UNKNOWN_DATE_BUCKET.to_string(),
        },
        ClassificationStrategy::ByFileType => match &entry.extension {
            Some(ext) => ext.to_uppercase(),
            None => NO_EXTENSION_BUCKET.to_string(),
        },
    }
}
