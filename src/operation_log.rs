//! Durable record of the mutations performed inside a destination folder.
//!
//! The log lives in `<destination>/Operation.txt`, one human-readable line per
//! entry:
//!
//! ```text
//! Directory created: 2024-01-02
//! File moved: 2024-01-02/photo.jpg	from: /home/me/Pictures/photo.jpg
//! ```
//!
//! Paths are relative to the destination folder and always use `/`. The
//! original location of a moved file follows a TAB, so undo never needs to know
//! which source folder a run used. Names containing TAB, CR or LF are refused
//! before anything is mutated, which keeps every line unambiguous.
//!
//! An entry's `sequence` is its 1-based line number. The file only grows during
//! an organize run; the sole removal path is [`LogGuard::remove_last`], which
//! drops the last line by position and rewrites the file.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{LogCorruptError, OrganizeError, Result};

/// Name of the log file inside every destination folder.
pub const LOG_FILE_NAME: &str = "Operation.txt";

const DIRECTORY_CREATED_LABEL: &str = "Directory created";
const FILE_MOVED_LABEL: &str = "File moved";
const ORIGIN_SEPARATOR: &str = "\tfrom: ";
pub(crate) const TEMP_FILE_NAME: &str = ".Operation.txt.tmp";

/// The kind of mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntryKind {
    DirectoryCreated,
    FileMoved,
}

impl EntryKind {
    fn label(&self) -> &'static str {
        match self {
            Self::DirectoryCreated => DIRECTORY_CREATED_LABEL,
            Self::FileMoved => FILE_MOVED_LABEL,
        }
    }
}

/// One durable record in the operation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationLogEntry {
    /// 1-based line number of this entry in the log file.
    pub sequence: u64,
    pub kind: EntryKind,
    /// Path of the created folder or moved file, relative to the destination.
    pub primary_path: PathBuf,
    /// Where a moved file came from. Always set for `FileMoved`.
    pub original_path: Option<PathBuf>,
}

impl OperationLogEntry {
    /// Resolves the primary path against the destination folder.
    pub fn resolve(&self, destination: &Path) -> PathBuf {
        destination.join(&self.primary_path)
    }

    fn to_line(&self) -> String {
        let mut line = format!(
            "{}: {}",
            self.kind.label(),
            slash_path(&self.primary_path)
        );
        if let Some(original) = &self.original_path {
            line.push_str(ORIGIN_SEPARATOR);
            line.push_str(&original.to_string_lossy());
        }
        line
    }

    fn parse_line(line: &str, sequence: u64) -> std::result::Result<Self, String> {
        let (label, rest) = line
            .split_once(": ")
            .ok_or_else(|| "expected '<kind>: <path>'".to_string())?;

        let kind = match label {
            DIRECTORY_CREATED_LABEL => EntryKind::DirectoryCreated,
            FILE_MOVED_LABEL => EntryKind::FileMoved,
            other => return Err(format!("unknown entry kind '{other}'")),
        };

        let (primary, original) = match kind {
            EntryKind::DirectoryCreated => {
                if rest.contains('\t') {
                    return Err("unexpected origin on a directory entry".to_string());
                }
                (rest, None)
            }
            EntryKind::FileMoved => {
                let (primary, original) = rest
                    .split_once(ORIGIN_SEPARATOR)
                    .ok_or_else(|| "moved file has no recorded origin".to_string())?;
                if original.is_empty() {
                    return Err("moved file has an empty origin".to_string());
                }
                (primary, Some(PathBuf::from(original)))
            }
        };

        if primary.is_empty() {
            return Err("missing path".to_string());
        }

        Ok(Self {
            sequence,
            kind,
            primary_path: PathBuf::from(primary),
            original_path: original,
        })
    }
}

/// Human-readable summary without the origin, e.g. `File moved: 2024-01-02/photo.jpg`.
impl std::fmt::Display for OperationLogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.label(), slash_path(&self.primary_path))
    }
}

/// A mutation about to be recorded. Paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    DirectoryCreated { path: PathBuf },
    FileMoved { path: PathBuf, original: PathBuf },
}

/// Checks that `path` can be written into a log line and parsed back unchanged.
pub fn ensure_loggable(path: &Path) -> Result<()> {
    match path.to_str() {
        Some(s) if !s.contains(['\t', '\r', '\n']) => Ok(()),
        _ => Err(OrganizeError::UnsupportedName {
            path: path.to_path_buf(),
        }),
    }
}

/// Joins the normal components of a relative path with `/`.
fn slash_path(path: &Path) -> String {
    if path.is_absolute() {
        return path.to_string_lossy().into_owned();
    }
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Default)]
struct LogState {
    /// File length and next sequence number as of our last write.
    cached: Option<(u64, u64)>,
}

static LOG_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<Mutex<LogState>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn state_for(destination: &Path) -> Arc<Mutex<LogState>> {
    let key = fs::canonicalize(destination).unwrap_or_else(|_| destination.to_path_buf());
    let mut locks = LOG_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(key).or_default())
}

/// Handle to the operation log of one destination folder.
///
/// Every handle for the same folder shares one process-wide mutex, so organize,
/// undo and history reads never interleave.
#[derive(Debug, Clone)]
pub struct OperationLog {
    destination: PathBuf,
    path: PathBuf,
    state: Arc<Mutex<LogState>>,
}

impl OperationLog {
    /// Opens the log for `destination`. Nothing is read or created yet.
    pub fn open(destination: &Path) -> Self {
        Self {
            destination: destination.to_path_buf(),
            path: destination.join(LOG_FILE_NAME),
            state: state_for(destination),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Location of `Operation.txt`.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Takes exclusive access to the log until the guard is dropped.
    pub fn lock(&self) -> LogGuard<'_> {
        LogGuard {
            log: self,
            state: self.state.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn append(&self, mutation: Mutation) -> Result<OperationLogEntry> {
        self.lock().append(mutation)
    }

    pub fn read_all(&self) -> Result<Vec<OperationLogEntry>> {
        self.lock().read_all()
    }

    pub fn read_last(&self) -> Result<Option<OperationLogEntry>> {
        self.lock().read_last()
    }

    pub fn remove_last(&self) -> Result<Option<OperationLogEntry>> {
        self.lock().remove_last()
    }

    fn relative_to_destination(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.destination)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    fn read_content(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(OrganizeError::from_io(&self.path, e)),
        }
    }

    fn corrupt(&self, content: &str, line_number: usize, reason: String) -> OrganizeError {
        let (entries, _) = parse_content(content);
        LogCorruptError {
            log_path: self.path.clone(),
            line_number,
            reason,
            entries,
        }
        .into()
    }
}

/// Exclusive access to one destination's log.
pub struct LogGuard<'a> {
    log: &'a OperationLog,
    state: MutexGuard<'a, LogState>,
}

impl LogGuard<'_> {
    /// Location of `Operation.txt`.
    pub fn path(&self) -> &Path {
        &self.log.path
    }

    /// Appends one entry and flushes it to disk before returning.
    ///
    /// The log file is created on the first append.
    pub fn append(&mut self, mutation: Mutation) -> Result<OperationLogEntry> {
        let (kind, primary, original) = match mutation {
            Mutation::DirectoryCreated { path } => (EntryKind::DirectoryCreated, path, None),
            Mutation::FileMoved { path, original } => {
                ensure_loggable(&original)?;
                (EntryKind::FileMoved, path, Some(original))
            }
        };
        ensure_loggable(&primary)?;

        let log_path = &self.log.path;
        let io_err = |e| OrganizeError::from_io(log_path, e);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len();

        let (sequence, prefix) = match self.state.cached {
            Some((cached_len, next)) if cached_len == len => (next, ""),
            _ => {
                let content = self.log.read_content()?;
                let prefix = if content.is_empty() || content.ends_with('\n') {
                    ""
                } else {
                    "\n"
                };
                (content.lines().count() as u64 + 1, prefix)
            }
        };

        let entry = OperationLogEntry {
            sequence,
            kind,
            primary_path: self.log.relative_to_destination(&primary),
            original_path: original,
        };
        let record = format!("{prefix}{}\n", entry.to_line());

        file.write_all(record.as_bytes()).map_err(io_err)?;
        file.sync_data().map_err(io_err)?;

        self.state.cached = Some((len + record.len() as u64, sequence + 1));
        tracing::debug!(sequence, entry = %entry, "Appended operation log entry");
        Ok(entry)
    }

    /// Reads every entry in file order.
    ///
    /// A missing log is empty. An unparseable line fails with
    /// [`LogCorruptError`], which still carries all entries that did parse.
    pub fn read_all(&self) -> Result<Vec<OperationLogEntry>> {
        let content = self.log.read_content()?;
        match parse_content(&content) {
            (entries, None) => Ok(entries),
            (entries, Some((line_number, reason))) => Err(LogCorruptError {
                log_path: self.log.path.clone(),
                line_number,
                reason,
                entries,
            }
            .into()),
        }
    }

    /// Returns the logically last entry, ignoring blank lines.
    pub fn read_last(&self) -> Result<Option<OperationLogEntry>> {
        let content = self.log.read_content()?;
        match last_line(&content) {
            None => Ok(None),
            Some((index, line)) => {
                let sequence = index as u64 + 1;
                OperationLogEntry::parse_line(line, sequence)
                    .map(Some)
                    .map_err(|reason| self.log.corrupt(&content, index + 1, reason))
            }
        }
    }

    /// Drops the last non-blank line and rewrites the log.
    ///
    /// The line is chosen by position, so two textually identical entries are
    /// never confused. A corrupt last line is left in place.
    pub fn remove_last(&mut self) -> Result<Option<OperationLogEntry>> {
        let content = self.log.read_content()?;
        let Some((index, line)) = last_line(&content) else {
            return Ok(None);
        };
        let removed = OperationLogEntry::parse_line(line, index as u64 + 1)
            .map_err(|reason| self.log.corrupt(&content, index + 1, reason))?;

        let mut remaining = content.lines().take(index).collect::<Vec<_>>().join("\n");
        if !remaining.is_empty() {
            remaining.push('\n');
        }
        self.rewrite(&remaining)?;

        self.state.cached = Some((remaining.len() as u64, index as u64 + 1));
        tracing::debug!(sequence = removed.sequence, entry = %removed, "Removed last operation log entry");
        Ok(Some(removed))
    }

    fn rewrite(&self, content: &str) -> Result<()> {
        let temp_path = self.log.destination.join(TEMP_FILE_NAME);
        let io_err = |e| OrganizeError::from_io(&temp_path, e);

        let mut file = File::create(&temp_path).map_err(io_err)?;
        file.write_all(content.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&temp_path, &self.log.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            OrganizeError::from_io(&self.log.path, e)
        })
    }
}

fn last_line(content: &str) -> Option<(usize, &str)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .last()
}

/// Parses every non-blank line, remembering the first failure.
fn parse_content(content: &str) -> (Vec<OperationLogEntry>, Option<(usize, String)>) {
    let mut entries = Vec::new();
    let mut first_error = None;

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match OperationLogEntry::parse_line(line, index as u64 + 1) {
            Ok(entry) => entries.push(entry),
            Err(reason) => {
                if first_error.is_none() {
                    first_error = Some((index + 1, reason));
                }
            }
        }
    }

    (entries, first_error)
}

/// Returns the path of the log file for `destination`, without touching disk.
pub fn open_log(destination: &Path) -> PathBuf {
    destination.join(LOG_FILE_NAME)
}

/// Reads the history recorded in `destination` for display.
pub fn history(destination: &Path) -> Result<Vec<OperationLogEntry>> {
    if !destination.is_dir() {
        return Err(OrganizeError::PathNotFound {
            path: destination.to_path_buf(),
        });
    }
    OperationLog::open(destination).read_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn moved(dest: &Path, rel: &str, original: &str) -> Mutation {
        Mutation::FileMoved {
            path: dest.join(rel),
            original: PathBuf::from(original),
        }
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let log = OperationLog::open(temp_dir.path());

        assert!(log.read_all().expect("read failed").is_empty());
        assert_eq!(log.read_last().expect("read failed"), None);
        assert_eq!(log.remove_last().expect("remove failed"), None);
        assert!(!log.path().exists(), "reading must not create the log");
    }

    #[test]
    fn test_append_writes_relative_lines() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path();
        let log = OperationLog::open(dest);

        let dir_entry = log
            .append(Mutation::DirectoryCreated {
                path: dest.join("2024-01-02"),
            })
            .expect("append failed");
        let file_entry = log
            .append(moved(dest, "2024-01-02/photo.jpg", "/src/photo.jpg"))
            .expect("append failed");

        assert_eq!(dir_entry.sequence, 1);
        assert_eq!(file_entry.sequence, 2);
        assert_eq!(dir_entry.to_string(), "Directory created: 2024-01-02");
        assert_eq!(file_entry.to_string(), "File moved: 2024-01-02/photo.jpg");

        let content = fs::read_to_string(log.path()).expect("Failed to read log");
        assert_eq!(
            content,
            "Directory created: 2024-01-02\nFile moved: 2024-01-02/photo.jpg\tfrom: /src/photo.jpg\n"
        );
    }

    #[test]
    fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path();

        OperationLog::open(dest)
            .append(moved(dest, "JPG/a.jpg", "/src/a.jpg"))
            .expect("append failed");

        let entries = OperationLog::open(dest).read_all().expect("read failed");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::FileMoved);
        assert_eq!(entries[0].primary_path, PathBuf::from("JPG/a.jpg"));
        assert_eq!(entries[0].original_path, Some(PathBuf::from("/src/a.jpg")));
        assert_eq!(entries[0].resolve(dest), dest.join("JPG").join("a.jpg"));
    }

    #[test]
    fn test_remove_last_is_positional() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path();
        let log = OperationLog::open(dest);

        // Two textually identical lines: only the final one may go.
        log.append(moved(dest, "JPG/a.jpg", "/src/a.jpg"))
            .expect("append failed");
        log.append(moved(dest, "PNG/b.png", "/src/b.png"))
            .expect("append failed");
        log.append(moved(dest, "JPG/a.jpg", "/src/a.jpg"))
            .expect("append failed");

        let removed = log.remove_last().expect("remove failed").expect("entry");
        assert_eq!(removed.sequence, 3);

        let remaining = log.read_all().expect("read failed");
        let lines: Vec<String> = remaining.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec!["File moved: JPG/a.jpg", "File moved: PNG/b.png"]
        );
    }

    #[test]
    fn test_append_after_remove_continues_sequence() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path();
        let log = OperationLog::open(dest);

        log.append(Mutation::DirectoryCreated { path: dest.join("A") })
            .expect("append failed");
        log.append(Mutation::DirectoryCreated { path: dest.join("B") })
            .expect("append failed");
        log.remove_last().expect("remove failed");

        let entry = log
            .append(Mutation::DirectoryCreated { path: dest.join("C") })
            .expect("append failed");
        assert_eq!(entry.sequence, 2);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path();
        fs::write(
            dest.join(LOG_FILE_NAME),
            "Directory created: A\n\n   \nDirectory created: B\n\n",
        )
        .expect("Failed to seed log");

        let log = OperationLog::open(dest);
        let entries = log.read_all().expect("read failed");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].sequence, 4);

        let removed = log.remove_last().expect("remove failed").expect("entry");
        assert_eq!(removed.primary_path, PathBuf::from("B"));
        let content = fs::read_to_string(log.path()).expect("Failed to read log");
        assert_eq!(content, "Directory created: A\n\n   \n");
    }

    #[test]
    fn test_corrupt_line_reports_number_and_keeps_valid_entries() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path();
        fs::write(
            dest.join(LOG_FILE_NAME),
            "Directory created: A\nsomething odd\nDirectory created: B\n",
        )
        .expect("Failed to seed log");

        let err = OperationLog::open(dest).read_all().expect_err("should be corrupt");
        assert_eq!(err.kind(), ErrorKind::LogCorrupt);
        match err {
            OrganizeError::LogCorrupt(corrupt) => {
                assert_eq!(corrupt.line_number, 2);
                assert_eq!(corrupt.entries.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_moved_line_without_origin_is_corrupt() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path();
        fs::write(dest.join(LOG_FILE_NAME), "File moved: JPG/a.jpg\n").expect("seed");

        let log = OperationLog::open(dest);
        assert!(matches!(log.read_last(), Err(OrganizeError::LogCorrupt(_))));
        assert!(matches!(log.remove_last(), Err(OrganizeError::LogCorrupt(_))));
        // Refusing to pop leaves the line in place.
        let content = fs::read_to_string(log.path()).expect("Failed to read log");
        assert_eq!(content, "File moved: JPG/a.jpg\n");
    }

    #[test]
    fn test_append_repairs_missing_trailing_newline() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path();
        fs::write(dest.join(LOG_FILE_NAME), "Directory created: A").expect("seed");

        let log = OperationLog::open(dest);
        let entry = log
            .append(Mutation::DirectoryCreated { path: dest.join("B") })
            .expect("append failed");
        assert_eq!(entry.sequence, 2);
        assert_eq!(log.read_all().expect("read failed").len(), 2);
    }

    #[test]
    fn test_unloggable_names_are_refused() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dest = temp_dir.path();
        let log = OperationLog::open(dest);

        let err = log
            .append(moved(dest, "JPG/bad\tname.jpg", "/src/bad\tname.jpg"))
            .expect_err("tab must be refused");
        assert_eq!(err.kind(), ErrorKind::UnsupportedName);
        assert!(!log.path().exists());
    }

    #[test]
    fn test_last_line_skips_trailing_blanks() {
        assert_eq!(last_line(""), None);
        assert_eq!(last_line("\n  \n"), None);
        assert_eq!(
            last_line("Directory created: A\nDirectory created: B\n\n \n"),
            Some((1, "Directory created: B"))
        );
    }

    #[test]
    fn test_history_requires_existing_destination() {
        let err = history(Path::new("/non/existent/destination")).expect_err("missing dir");
        assert_eq!(err.kind(), ErrorKind::PathNotFound);
    }
}
