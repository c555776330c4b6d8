//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored output,
//! progress tracking, and formatted summaries of organize and undo results.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;

use crate::operation_log::OperationLogEntry;
use crate::session::{FileFailure, OrganizeResult, ProgressReporter};
use crate::undo::UndoOutcome;

/// How many per-file errors a summary lists before collapsing the rest.
pub const MAX_LISTED_ERRORS: usize = 10;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Progress bars for organize runs
/// - Summary tables per destination folder
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use photo_organizer::output::OutputFormatter;
    /// OutputFormatter::success("Photos organized!");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates and returns a progress bar for file operations.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use photo_organizer::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("Completed!");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints a summary table with the number of files moved per folder.
    pub fn summary_table(folder_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let max_folder_len = folder_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(6); // At least "Folder" width

        println!(
            "{:<width$} | {}",
            "Folder".bold(),
            "Files".bold(),
            width = max_folder_len
        );
        println!("{}", "-".repeat(max_folder_len + 10));

        for (folder, count) in folder_counts {
            println!(
                "{:<width$} | {} {}",
                folder,
                count.to_string().green(),
                plural(*count),
                width = max_folder_len
            );
        }

        println!("{}", "-".repeat(max_folder_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files),
            width = max_folder_len
        );
    }

    /// Prints the outcome of an organize run: counts, the first errors and a table.
    pub fn organize_summary(result: &OrganizeResult) {
        if result.moved > 0 {
            Self::summary_table(&result.moved_per_bucket(), result.moved);
        }

        if result.cancelled {
            Self::warning(&format!(
                "Cancelled: {} {} left in place",
                result.skipped.len(),
                plural(result.skipped.len())
            ));
        }

        if !result.errors.is_empty() {
            Self::failures(&result.errors);
        }

        if result.is_complete_success() {
            Self::success(&format!("Organized {} {}", result.moved, plural(result.moved)));
        }
    }

    /// Lists the first [`MAX_LISTED_ERRORS`] failures.
    pub fn failures(errors: &[FileFailure]) {
        Self::error(&format!(
            "{} {} could not be organized:",
            errors.len(),
            plural(errors.len())
        ));
        for failure in errors.iter().take(MAX_LISTED_ERRORS) {
            eprintln!(
                "    - {} [{}]: {}",
                failure.path.display(),
                failure.kind.to_string().yellow(),
                failure.message
            );
        }
        if errors.len() > MAX_LISTED_ERRORS {
            eprintln!("    ... and {} more", errors.len() - MAX_LISTED_ERRORS);
        }
    }

    /// Prints what an undo step did.
    pub fn undo_outcome(outcome: &UndoOutcome) {
        match outcome {
            UndoOutcome::Restored { restored_to, .. } => {
                Self::success(&format!("Restored {}", restored_to.display()));
            }
            UndoOutcome::Removed { entry } => {
                Self::success(&format!("Removed folder {}", entry.primary_path.display()));
            }
            UndoOutcome::AlreadyGone { entry } => Self::warning(&format!(
                "Folder {} was already gone; dropped it from the log",
                entry.primary_path.display()
            )),
            UndoOutcome::NothingToUndo => Self::info("Nothing to undo."),
        }
    }

    /// Prints log entries, oldest first.
    pub fn history(entries: &[OperationLogEntry]) {
        if entries.is_empty() {
            Self::info("No operations recorded.");
            return;
        }
        for entry in entries {
            println!("{:>5}  {}", entry.sequence.to_string().dimmed(), entry);
        }
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

impl ProgressReporter for ProgressBar {
    fn file_processed(&self, path: &Path) {
        if let Some(name) = path.file_name() {
            self.set_message(name.to_string_lossy().into_owned());
        }
        self.inc(1);
    }
}
