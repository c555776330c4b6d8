//! Batch orchestration: scan a source folder, classify every file, and move
//! it into its bucket under the destination.
//!
//! Callers follow a two-step protocol. [`OrganizeSession::propose`] inspects
//! the filesystem and returns a [`Proposal`] that can be shown to a user;
//! nothing is mutated. [`OrganizeSession::execute`] then carries the proposal
//! out. The session keeps no state between calls.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::classifier::{ClassificationStrategy, FileEntry, classify};
use crate::config::{CompiledFilters, ConfigError, EngineConfig};
use crate::error::{ErrorKind, OrganizeError, Result};
use crate::executor::OperationExecutor;
use crate::operation_log::{LOG_FILE_NAME, OperationLog, OperationLogEntry, ensure_loggable};
use crate::undo::{UndoEngine, UndoOutcome};

/// Where to take files from, where to put them, and how to bucket them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizeRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub strategy: ClassificationStrategy,
}

impl OrganizeRequest {
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        strategy: ClassificationStrategy,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            strategy,
        }
    }

    /// Resolves relative source and destination paths against the current
    /// working directory.
    pub fn absolute(&self) -> Result<Self> {
        let absolute = |path: &Path| {
            std::path::absolute(path).map_err(|e| OrganizeError::from_io(path, e))
        };
        Ok(Self {
            source: absolute(&self.source)?,
            destination: absolute(&self.destination)?,
            strategy: self.strategy,
        })
    }
}

/// An action a caller may want to confirm before it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Organize(OrganizeRequest),
    UndoLast { destination: PathBuf },
}

/// One file's planned route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub bucket: String,
    pub destination: PathBuf,
}

/// A file that could not be organized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

impl FileFailure {
    pub fn new(path: &Path, error: &OrganizeError) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// The classified contents of a source folder, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizePlan {
    pub request: OrganizeRequest,
    pub moves: Vec<PlannedMove>,
    /// Files found during the scan that cannot be moved at all.
    pub refused: Vec<FileFailure>,
}

impl OrganizePlan {
    /// Classifies `entries` and routes each one under the request's destination.
    pub fn from_entries(request: OrganizeRequest, entries: Vec<FileEntry>) -> Self {
        let mut moves = Vec::with_capacity(entries.len());
        let mut refused = Vec::new();

        for entry in entries {
            let bucket = classify(&entry, request.strategy);
            let destination = request.destination.join(&bucket).join(&entry.name);
            match ensure_loggable(&entry.path).and_then(|()| ensure_loggable(&destination)) {
                Ok(()) => moves.push(PlannedMove {
                    source: entry.path,
                    bucket,
                    destination,
                }),
                Err(e) => refused.push(FileFailure::new(&entry.path, &e)),
            }
        }

        Self {
            request,
            moves,
            refused,
        }
    }

    /// Planned moves grouped by bucket, in bucket order.
    pub fn buckets(&self) -> BTreeMap<&str, Vec<&PlannedMove>> {
        let mut buckets: BTreeMap<&str, Vec<&PlannedMove>> = BTreeMap::new();
        for planned in &self.moves {
            buckets.entry(planned.bucket.as_str()).or_default().push(planned);
        }
        buckets
    }
}

/// What `execute` would do, in a form a caller can show before confirming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proposal {
    Organize(OrganizePlan),
    UndoLast {
        destination: PathBuf,
        entry: Option<OperationLogEntry>,
    },
}

impl fmt::Display for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Organize(plan) => {
                let request = &plan.request;
                if plan.moves.is_empty() {
                    return write!(f, "No files to organize in {}", request.source.display());
                }
                writeln!(
                    f,
                    "Organize {} {} from {} into {} by {}:",
                    plan.moves.len(),
                    if plan.moves.len() == 1 { "file" } else { "files" },
                    request.source.display(),
                    request.destination.display(),
                    request.strategy
                )?;
                for (bucket, moves) in plan.buckets() {
                    let exists = request.destination.join(bucket).is_dir();
                    writeln!(
                        f,
                        "  {}/ {} {}{}",
                        bucket,
                        moves.len(),
                        if moves.len() == 1 { "file" } else { "files" },
                        if exists { "" } else { " (new folder)" }
                    )?;
                }
                if !plan.refused.is_empty() {
                    write!(f, "  {} file(s) cannot be organized", plan.refused.len())?;
                }
                Ok(())
            }
            Self::UndoLast { destination, entry } => match entry {
                Some(entry) => write!(f, "Undo \"{}\" in {}", entry, destination.display()),
                None => write!(f, "Nothing to undo in {}", destination.display()),
            },
        }
    }
}

/// The per-run outcome of an organize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrganizeResult {
    /// Number of files moved.
    pub moved: usize,
    pub errors: Vec<FileFailure>,
    /// Log entries produced, in sequence order.
    pub entries: Vec<OperationLogEntry>,
    /// Files not attempted because the run was cancelled.
    pub skipped: Vec<PathBuf>,
    pub cancelled: bool,
}

impl OrganizeResult {
    /// Returns true if every planned file was moved.
    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty() && self.skipped.is_empty()
    }

    /// Number of files moved into each bucket folder.
    pub fn moved_per_bucket(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            if entry.kind != crate::operation_log::EntryKind::FileMoved {
                continue;
            }
            if let Some(bucket) = entry.primary_path.iter().next() {
                *counts
                    .entry(bucket.to_string_lossy().into_owned())
                    .or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Result of executing a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Organized(OrganizeResult),
    Undone(UndoOutcome),
}

/// Cooperative cancellation, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives a notification after each file is processed.
pub trait ProgressReporter: Send + Sync {
    fn file_processed(&self, path: &Path);
}

/// Runs organize and undo actions.
pub struct OrganizeSession {
    filters: CompiledFilters,
    parallel: bool,
    cancel: CancelToken,
    progress: Option<Box<dyn ProgressReporter>>,
}

impl Default for OrganizeSession {
    fn default() -> Self {
        Self::new(CompiledFilters::default(), false)
    }
}

impl OrganizeSession {
    pub fn new(filters: CompiledFilters, parallel: bool) -> Self {
        Self {
            filters,
            parallel,
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    /// Builds a session from loaded configuration.
    pub fn from_config(config: &EngineConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(
            config.filters.compile()?,
            config.organize.parallel,
        ))
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.progress = Some(reporter);
        self
    }

    /// Describes what `action` would do without changing anything.
    pub fn propose(&self, action: &Action) -> Result<Proposal> {
        match action {
            Action::Organize(request) => {
                let request = request.absolute()?;
                let entries = self.scan(&request)?;
                Ok(Proposal::Organize(OrganizePlan::from_entries(request, entries)))
            }
            Action::UndoLast { destination } => {
                require_dir(destination)?;
                let entry = OperationLog::open(destination).read_last()?;
                Ok(Proposal::UndoLast {
                    destination: destination.clone(),
                    entry,
                })
            }
        }
    }

    /// Carries out a proposal.
    ///
    /// Organize proposals never fail as a whole once the destination is
    /// confirmed; per-file problems end up in [`OrganizeResult::errors`].
    pub fn execute(&self, proposal: Proposal) -> Result<ActionOutcome> {
        match proposal {
            Proposal::Organize(plan) => {
                require_dir(&plan.request.destination)?;
                Ok(ActionOutcome::Organized(self.run_plan(plan)))
            }
            Proposal::UndoLast { destination, .. } => {
                UndoEngine::undo_last(&destination).map(ActionOutcome::Undone)
            }
        }
    }

    /// Proposes and immediately executes an organize.
    pub fn organize(&self, request: OrganizeRequest) -> Result<OrganizeResult> {
        let request = request.absolute()?;
        let entries = self.scan(&request)?;
        let plan = OrganizePlan::from_entries(request, entries);
        require_dir(&plan.request.destination)?;
        Ok(self.run_plan(plan))
    }

    /// Lists the files in the request's source folder that would be organized.
    ///
    /// Only regular files directly inside the source are considered, sorted by
    /// name. The destination's own log is never picked up.
    pub fn scan(&self, request: &OrganizeRequest) -> Result<Vec<FileEntry>> {
        let request = &request.absolute()?;
        require_dir(&request.source)?;
        require_dir(&request.destination)?;

        let same_folder = same_path(&request.source, &request.destination);
        let dir = fs::read_dir(&request.source)
            .map_err(|e| OrganizeError::from_io(&request.source, e))?;

        let mut entries = Vec::new();
        for dir_entry in dir {
            let dir_entry = match dir_entry {
                Ok(dir_entry) => dir_entry,
                Err(e) => {
                    tracing::warn!(source = %request.source.display(), error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if !dir_entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }

            let name = dir_entry.file_name();
            if same_folder && name == LOG_FILE_NAME {
                continue;
            }
            if !self.filters.should_include(Path::new(&name)) {
                tracing::debug!(file = %name.to_string_lossy(), "Filtered out");
                continue;
            }

            let path = dir_entry.path();
            match FileEntry::from_path(&path) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Could not read metadata, using defaults");
                    entries.push(FileEntry::new(&path, None));
                }
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::debug!(count = entries.len(), source = %request.source.display(), "Scanned source folder");
        Ok(entries)
    }

    fn run_plan(&self, plan: OrganizePlan) -> OrganizeResult {
        let log = OperationLog::open(&plan.request.destination);
        let executor = OperationExecutor::new(&log);
        let mut result = OrganizeResult {
            errors: plan.refused.clone(),
            ..OrganizeResult::default()
        };

        tracing::info!(
            source = %plan.request.source.display(),
            destination = %plan.request.destination.display(),
            strategy = %plan.request.strategy,
            files = plan.moves.len(),
            "Organizing"
        );

        for (bucket, moves) in plan.buckets() {
            if self.cancel.is_cancelled() {
                result.cancelled = true;
                result.skipped.extend(moves.iter().map(|m| m.source.clone()));
                continue;
            }

            let folder = plan.request.destination.join(bucket);
            match executor.ensure_folder(&folder) {
                Ok(Some(entry)) => result.entries.push(entry),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(folder = %folder.display(), error = %e, "Bucket unavailable");
                    for planned in &moves {
                        result.errors.push(FileFailure::new(&planned.source, &e));
                        self.report_progress(&planned.source);
                    }
                    continue;
                }
            }

            let outcomes: Vec<(&PlannedMove, Option<Result<OperationLogEntry>>)> = if self.parallel {
                moves
                    .par_iter()
                    .map(|planned| (*planned, self.move_one(&executor, planned)))
                    .collect()
            } else {
                moves
                    .iter()
                    .map(|planned| (*planned, self.move_one(&executor, planned)))
                    .collect()
            };

            for (planned, outcome) in outcomes {
                match outcome {
                    None => {
                        result.cancelled = true;
                        result.skipped.push(planned.source.clone());
                    }
                    Some(Ok(entry)) => {
                        result.moved += 1;
                        result.entries.push(entry);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(file = %planned.source.display(), error = %e, "Could not organize file");
                        result.errors.push(FileFailure::new(&planned.source, &e));
                    }
                }
            }
        }

        result.entries.sort_by_key(|entry| entry.sequence);
        tracing::info!(
            moved = result.moved,
            failed = result.errors.len(),
            skipped = result.skipped.len(),
            "Organize finished"
        );
        result
    }

    /// Moves one planned file unless the run was cancelled first.
    fn move_one(
        &self,
        executor: &OperationExecutor<'_>,
        planned: &PlannedMove,
    ) -> Option<Result<OperationLogEntry>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let outcome = executor.move_file(&planned.source, &planned.destination);
        self.report_progress(&planned.source);
        Some(outcome)
    }

    fn report_progress(&self, path: &Path) {
        if let Some(progress) = &self.progress {
            progress.file_processed(path);
        }
    }
}

fn require_dir(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(OrganizeError::PathNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(OrganizeError::from_io(path, e)),
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Organizes `source` into `destination` with default settings.
pub fn organize(
    source: &Path,
    destination: &Path,
    strategy: ClassificationStrategy,
) -> Result<OrganizeResult> {
    OrganizeSession::default().organize(OrganizeRequest::new(source, destination, strategy))
}
