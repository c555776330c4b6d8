//! Command-line interface module for photo-organizer.
//!
//! This module handles all CLI-related functionality including:
//! - Command parsing and validation
//! - Configuration loading and flag overrides
//! - Confirmation before anything is changed
//! - Rendering organize, undo and history results

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::classifier::ClassificationStrategy;
use crate::config::EngineConfig;
use crate::error::OrganizeError;
use crate::operation_log::{history, open_log};
use crate::output::OutputFormatter;
use crate::session::{Action, ActionOutcome, OrganizeRequest, OrganizeSession, Proposal};

/// Sort photos into date or file-type folders, with one-step undo.
#[derive(Debug, Parser)]
#[command(name = "photo-organizer", version, about)]
pub struct Cli {
    /// Print engine diagnostics to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file to use instead of the default lookup.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Represents a CLI command to execute.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Move files from SOURCE into dated or typed folders under DESTINATION.
    Organize {
        source: PathBuf,
        destination: PathBuf,

        /// Classification strategy: `date` or `type`.
        #[arg(long, value_name = "STRATEGY")]
        by: Option<ClassificationStrategy>,

        /// Show what would happen without moving anything.
        #[arg(long)]
        dry_run: bool,

        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,

        /// Move files within each folder in parallel.
        #[arg(long)]
        parallel: bool,

        /// Also organize hidden files.
        #[arg(long)]
        include_hidden: bool,
    },
    /// Reverse the most recent recorded operation in DESTINATION.
    Undo {
        destination: PathBuf,

        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the operations recorded in DESTINATION.
    History {
        destination: PathBuf,

        /// Print entries as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Runs the CLI application, reading confirmations from stdin.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use photo_organizer::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from(["photo-organizer", "history", "/path/to/dest"]);
/// if let Err(e) = run_cli(cli) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let stdin = io::stdin();
    run_cli_with_input(cli, &mut stdin.lock())
}

/// Runs the CLI application with confirmations read from `input`.
pub fn run_cli_with_input(cli: Cli, input: &mut dyn BufRead) -> anyhow::Result<()> {
    let mut config = EngineConfig::load(cli.config.as_deref())
        .context("Error loading configuration")?;

    match cli.command {
        Command::Organize {
            source,
            destination,
            by,
            dry_run,
            yes,
            parallel,
            include_hidden,
        } => {
            config.organize.parallel |= parallel;
            config.filters.enable_hidden_files |= include_hidden;
            let strategy = by.unwrap_or(config.organize.strategy);
            let request = OrganizeRequest::new(source, destination, strategy);
            organize(&config, request, dry_run, yes, input)
        }
        Command::Undo { destination, yes } => {
            undo(&config, Action::UndoLast { destination }, yes, input)
        }
        Command::History { destination, json } => show_history(destination, json),
    }
}

fn organize(
    config: &EngineConfig,
    request: OrganizeRequest,
    dry_run: bool,
    yes: bool,
    input: &mut dyn BufRead,
) -> anyhow::Result<()> {
    let session = OrganizeSession::from_config(config).context("Error compiling filters")?;
    let proposal = session
        .propose(&Action::Organize(request))
        .context("Could not prepare organize")?;

    let Proposal::Organize(plan) = &proposal else {
        bail!("unexpected proposal for an organize request");
    };

    if dry_run {
        OutputFormatter::dry_run_notice(&proposal.to_string());
        for planned in &plan.moves {
            OutputFormatter::plain(&format!(
                "   {} → {}/",
                planned.source.display(),
                planned.bucket
            ));
        }
        OutputFormatter::dry_run_notice("No files were modified.");
        return Ok(());
    }

    OutputFormatter::info(&proposal.to_string());
    if plan.moves.is_empty() {
        if !plan.refused.is_empty() {
            OutputFormatter::failures(&plan.refused);
        }
        return Ok(());
    }
    if !yes && !confirm("Proceed?", input)? {
        OutputFormatter::plain("Cancelled. No files were modified.");
        return Ok(());
    }

    let destination = plan.request.destination.clone();
    let progress = OutputFormatter::create_progress_bar(plan.moves.len() as u64);
    let session = session.with_progress(Box::new(progress.clone()));
    let outcome = session.execute(proposal);
    progress.finish_and_clear();

    match outcome.context("Organize failed")? {
        ActionOutcome::Organized(result) => {
            OutputFormatter::organize_summary(&result);
            if result.moved > 0 {
                OutputFormatter::plain(&format!(
                    "History saved to {}. Use 'photo-organizer undo' to step back.",
                    open_log(&destination).display()
                ));
            }
            Ok(())
        }
        ActionOutcome::Undone(_) => bail!("unexpected undo outcome for an organize request"),
    }
}

fn undo(
    config: &EngineConfig,
    action: Action,
    yes: bool,
    input: &mut dyn BufRead,
) -> anyhow::Result<()> {
    let session = OrganizeSession::from_config(config).context("Error compiling filters")?;
    let proposal = session.propose(&action).context("Could not read operation log")?;

    if let Proposal::UndoLast { entry: None, .. } = &proposal {
        OutputFormatter::info(&proposal.to_string());
        return Ok(());
    }

    OutputFormatter::info(&proposal.to_string());
    if !yes && !confirm("Proceed?", input)? {
        OutputFormatter::plain("Cancelled. Nothing was changed.");
        return Ok(());
    }

    match session.execute(proposal) {
        Ok(ActionOutcome::Undone(outcome)) => {
            OutputFormatter::undo_outcome(&outcome);
            Ok(())
        }
        Ok(ActionOutcome::Organized(_)) => bail!("unexpected organize outcome for an undo request"),
        Err(e) => {
            let hint = match &e {
                OrganizeError::NotEmpty { .. } => {
                    " Move the new files out of the folder and try again."
                }
                OrganizeError::NotFound { .. } => {
                    " The file was moved or deleted since it was organized."
                }
                OrganizeError::Conflict { .. } => {
                    " Something now occupies the original location."
                }
                _ => "",
            };
            Err(anyhow::Error::new(e)).context(format!("Undo refused.{hint}"))
        }
    }
}

fn show_history(destination: PathBuf, json: bool) -> anyhow::Result<()> {
    let entries = match history(&destination) {
        Ok(entries) => entries,
        Err(OrganizeError::LogCorrupt(corrupt)) => {
            OutputFormatter::warning(&corrupt.to_string());
            corrupt.entries
        }
        Err(e) => return Err(e).context("Could not read history"),
    };

    if json {
        let rendered =
            serde_json::to_string_pretty(&entries).context("Could not serialize history")?;
        println!("{rendered}");
    } else {
        OutputFormatter::header(&open_log(&destination).display().to_string());
        OutputFormatter::history(&entries);
    }
    Ok(())
}

/// Asks a yes/no question; anything but `y`/`yes` means no.
fn confirm(prompt: &str, input: &mut dyn BufRead) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush().context("Could not write prompt")?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("Could not read confirmation")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_organize_command() {
        let cli = Cli::try_parse_from([
            "photo-organizer",
            "organize",
            "/src",
            "/dest",
            "--by",
            "type",
            "--dry-run",
        ])
        .expect("should parse");

        match cli.command {
            Command::Organize {
                source,
                destination,
                by,
                dry_run,
                yes,
                ..
            } => {
                assert_eq!(source, PathBuf::from("/src"));
                assert_eq!(destination, PathBuf::from("/dest"));
                assert_eq!(by, Some(ClassificationStrategy::ByFileType));
                assert!(dry_run);
                assert!(!yes);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_strategy() {
        let result = Cli::try_parse_from(["photo-organizer", "organize", "/a", "/b", "--by", "size"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_undo_and_history() {
        let cli = Cli::try_parse_from(["photo-organizer", "-v", "undo", "/dest", "-y"])
            .expect("should parse");
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Undo { yes: true, .. }));

        let cli = Cli::try_parse_from(["photo-organizer", "history", "/dest", "--json"])
            .expect("should parse");
        assert!(matches!(cli.command, Command::History { json: true, .. }));
    }

    #[test]
    fn test_confirm_reads_answer() {
        let mut yes = io::Cursor::new("Y\n");
        assert!(confirm("Go?", &mut yes).expect("confirm failed"));

        let mut no = io::Cursor::new("\n");
        assert!(!confirm("Go?", &mut no).expect("confirm failed"));
    }
}
