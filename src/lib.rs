//! photo-organizer - sort files into date or file-type folders, with undo
//!
//! This library classifies the files of a source folder into buckets (creation
//! date or extension), moves them into matching folders under a destination,
//! records every mutation in the destination's `Operation.txt`, and reverses
//! those mutations one at a time.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod operation_log;
pub mod output;
pub mod session;
pub mod undo;

use std::path::Path;

pub use classifier::{ClassificationStrategy, FileEntry, classify};
pub use config::{CompiledFilters, ConfigError, EngineConfig, FilterRules};
pub use error::{ErrorKind, LogCorruptError, OrganizeError, Result};
pub use executor::OperationExecutor;
pub use operation_log::{EntryKind, LOG_FILE_NAME, OperationLog, OperationLogEntry, history, open_log};
pub use session::{
    Action, ActionOutcome, CancelToken, FileFailure, OrganizePlan, OrganizeRequest,
    OrganizeResult, OrganizeSession, ProgressReporter, Proposal, organize,
};
pub use undo::{UndoEngine, UndoOutcome, UndoResult};

pub use cli::{Cli, run_cli};

/// Undoes the most recent logged mutation in `destination`.
pub fn undo_last(destination: &Path) -> UndoResult {
    UndoEngine::undo_last(destination)
}
