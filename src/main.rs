//! vaultmove - Move folders to remote storage, deleting them locally only
//! after the upload has been verified.
//!
//! Usage:
//!   vaultmove move <FOLDER>...      Upload, verify, then delete locally
//!   vaultmove analyze <FOLDER>...   Show what a move would transfer
//!   vaultmove verify <FOLDER>       Check an earlier upload (read-only)
//!   vaultmove check                 Check the transfer tool configuration
//!   vaultmove space                 Show free space on the remote
//!   vaultmove --help                Show help

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vaultmove_core::{
    AnalysisResult, BatchEstimate, BatchEvent, BatchResult, FolderEvent, FolderTask,
    IgnoreRuleSet, MoveConfig, MoveError, Outcome, ProgressEvent, TaskState,
};
use vaultmove_ops::MoveOrchestrator;
use vaultmove_scan::SizeAnalyzer;

#[derive(Parser)]
#[command(
    name = "vaultmove",
    version,
    about = "Move folders to remote storage, verified before anything is deleted",
    long_about = "vaultmove uploads local folders with rclone, checks every file \
                  arrived intact, and only then deletes the local copy.\n\n\
                  A folder whose upload or verification fails is never deleted."
)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload folders, verify them and delete the local copies
    Move {
        /// Folders to move, processed in order
        #[arg(required = true)]
        folders: Vec<PathBuf>,

        /// Ignore file (one pattern per line)
        #[arg(short, long)]
        ignore_file: Option<PathBuf>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show how many files and bytes a move would transfer
    Analyze {
        /// Folders to analyze
        #[arg(required = true)]
        folders: Vec<PathBuf>,

        /// Ignore file (one pattern per line)
        #[arg(short, long)]
        ignore_file: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Verify an earlier upload without changing anything
    Verify {
        /// Local folder that was uploaded
        folder: PathBuf,
    },

    /// Check that the transfer tool is installed and the remote is reachable
    Check,

    /// Show free space on the remote
    Space {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = MoveConfig::load_or_default(cli.config.as_deref())
        .wrap_err("Failed to load configuration")?;

    match cli.command {
        Command::Move {
            folders,
            ignore_file,
            yes,
        } => run_move(config, folders, ignore_file, yes).await,
        Command::Analyze {
            folders,
            ignore_file,
            format,
        } => run_analyze(&config, folders, ignore_file, format).await,
        Command::Verify { folder } => run_verify(config, &folder).await,
        Command::Check => run_check(config).await,
        Command::Space { format } => run_space(config, format).await,
    }
}

/// Log to stderr so stdout stays clean for JSON output.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Load the ignore rules for a batch.
///
/// An explicitly given file must exist; the configured default may be absent.
fn load_rules(
    config: &MoveConfig,
    explicit: Option<PathBuf>,
) -> std::result::Result<IgnoreRuleSet, MoveError> {
    let rules = match explicit {
        Some(path) => IgnoreRuleSet::load(&path)?,
        None => match config.ignore_file_path() {
            Some(path) => IgnoreRuleSet::load_or_empty(&path)?,
            None => IgnoreRuleSet::empty(),
        },
    };
    Ok(rules)
}

/// Move folders: estimate, confirm, then run the batch.
async fn run_move(
    config: MoveConfig,
    folders: Vec<PathBuf>,
    ignore_file: Option<PathBuf>,
    yes: bool,
) -> Result<ExitCode> {
    let rules = Arc::new(load_rules(&config, ignore_file)?);
    let orchestrator = Arc::new(MoveOrchestrator::new(config));
    let tasks = orchestrator.plan(&folders)?;

    eprintln!("Analyzing {} folder(s)...", tasks.len());
    let estimate = {
        let orchestrator = Arc::clone(&orchestrator);
        let folders = folders.clone();
        let rules = Arc::clone(&rules);
        tokio::task::spawn_blocking(move || orchestrator.estimate(&folders, &rules))
            .await
            .wrap_err("Analysis task failed")?
    };

    print_plan(&tasks, &estimate, rules.len());

    if !yes && !confirm("Upload, verify and then delete these folders locally?")? {
        println!("Nothing moved.");
        return Ok(ExitCode::SUCCESS);
    }

    let names: Vec<String> = tasks.iter().map(FolderTask::name).collect();
    let mut handle = orchestrator.start_batch(folders, rules);

    let cancel = handle.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("Cancelling; folders not yet started will be left alone...");
            cancel.cancel();
        }
    });

    let mut renderer = EventRenderer::new(names);
    while let Some(event) = handle.events.recv().await {
        renderer.render(&event);
    }

    let result = match handle.join.await.wrap_err("Batch task failed")? {
        Ok(result) => result,
        Err(MoveError::BatchAborted { reason, partial }) => {
            print_result(&partial);
            return Err(eyre!("Batch aborted: {reason}"));
        }
        Err(err) => return Err(err.into()),
    };

    print_result(&result);
    Ok(if result.all_succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Analyze folders without moving anything.
async fn run_analyze(
    config: &MoveConfig,
    folders: Vec<PathBuf>,
    ignore_file: Option<PathBuf>,
    format: OutputFormat,
) -> Result<ExitCode> {
    for folder in &folders {
        if !folder.is_dir() {
            bail!("Not a folder: {}", folder.display());
        }
    }

    let rules = load_rules(config, ignore_file)?;
    let (results, estimate) = tokio::task::spawn_blocking(move || {
        let (analyses, estimate) = SizeAnalyzer::new().analyze_all(&folders, &rules);
        let results: Vec<(PathBuf, AnalysisResult)> = folders.into_iter().zip(analyses).collect();
        (results, estimate)
    })
    .await
    .wrap_err("Analysis task failed")?;

    match format {
        OutputFormat::Text => {
            for (folder, analysis) in &results {
                let destination = config
                    .destination_for(folder)
                    .unwrap_or_else(|| "-".to_string());
                println!("{}", folder.display());
                println!("  -> {destination}");
                print_analysis(analysis);
            }
            println!();
            println!(
                "Total: {} files, {} ({} ignored) in {:.2}s",
                estimate.file_count,
                format_size(estimate.total_bytes),
                estimate.ignored_count,
                estimate.elapsed.as_secs_f64()
            );
        }
        OutputFormat::Json => {
            let folders: Vec<_> = results
                .iter()
                .map(|(folder, analysis)| {
                    serde_json::json!({
                        "folder": folder,
                        "destination": config.destination_for(folder),
                        "analysis": analysis,
                    })
                })
                .collect();
            let report = serde_json::json!({ "folders": folders, "total": estimate });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Verify an earlier upload of one folder.
async fn run_verify(config: MoveConfig, folder: &Path) -> Result<ExitCode> {
    let orchestrator = MoveOrchestrator::new(config);
    let cancel = CancellationToken::new();

    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    eprintln!("Verifying {}...", folder.display());
    let (destination, verdict) = orchestrator.verify_folder(folder, &cancel).await?;

    println!("{} -> {destination}", folder.display());
    println!("  {verdict}");

    Ok(if verdict.is_verified() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Check the transfer tool and remote.
async fn run_check(config: MoveConfig) -> Result<ExitCode> {
    let orchestrator = MoveOrchestrator::new(config);
    let tool = orchestrator.tool();

    let version = tool
        .version()
        .await
        .wrap_err_with(|| format!("{} is not usable", tool.program().display()))?;
    println!("Transfer tool: {version}");

    let space = orchestrator.preflight().await?;
    println!(
        "Remote {}: reachable, {} free",
        orchestrator.config().remote_root(),
        format_size(space.available())
    );

    Ok(ExitCode::SUCCESS)
}

/// Show remote free space.
async fn run_space(config: MoveConfig, format: OutputFormat) -> Result<ExitCode> {
    let orchestrator = MoveOrchestrator::new(config);
    let remote = orchestrator.config().remote_root();

    let space = orchestrator
        .tool()
        .remote_info(&remote)
        .await
        .wrap_err_with(|| format!("Failed to query {remote}"))?;

    match format {
        OutputFormat::Text => {
            println!("{remote}");
            println!("  Total: {}", format_size(space.total));
            println!("  Used:  {}", format_size(space.used));
            println!("  Free:  {}", format_size(space.available()));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&space)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_plan(tasks: &[FolderTask], estimate: &BatchEstimate, rule_count: usize) {
    println!();
    println!("{}", "─".repeat(60));
    for task in tasks {
        println!(" {} -> {}", task.local_path().display(), task.remote_destination());
    }
    println!("{}", "─".repeat(60));
    println!(
        " {} files, {} to upload",
        estimate.file_count,
        format_size(estimate.total_bytes)
    );
    if rule_count > 0 {
        println!(
            " {} files skipped by {} ignore rule(s)",
            estimate.ignored_count, rule_count
        );
    }
    if estimate.warning_count > 0 {
        println!(" {} entries could not be read", estimate.warning_count);
    }
    println!("{}", "─".repeat(60));
    println!();
}

fn print_analysis(analysis: &AnalysisResult) {
    println!(
        "  {} files, {} ({} ignored)",
        analysis.file_count,
        format_size(analysis.total_bytes),
        analysis.ignored_count
    );
    if !analysis.warnings.is_empty() {
        println!("  {} warning(s)", analysis.warnings.len());
    }
}

fn print_result(result: &BatchResult) {
    println!();
    println!("{}", "─".repeat(60));
    for task in &result.folders {
        let note = match task.state() {
            TaskState::Done => task
                .delete_report()
                .map(|r| r.summary())
                .unwrap_or_default(),
            TaskState::Failed => task
                .transfer_outcome()
                .and_then(Outcome::message)
                .map(|m| format!("{m}; {}", vaultmove_core::FILES_INTACT))
                .unwrap_or_else(|| vaultmove_core::FILES_INTACT.to_string()),
            TaskState::VerifiedButUnsafe => format!(
                "{}; {}",
                task.verify_result()
                    .and_then(|v| v.reason())
                    .unwrap_or("not verified"),
                vaultmove_core::FILES_INTACT
            ),
            TaskState::Pending => "not started".to_string(),
            _ => String::new(),
        };
        println!(" {:<20} {:<20} {}", truncate(&task.name(), 20), task.state(), note);
    }
    println!("{}", "─".repeat(60));
    println!(
        " Moved {} of {} folder(s), freed {} in {:.1}s",
        result.done_count(),
        result.folders.len(),
        format_size(result.bytes_freed()),
        result.elapsed().as_secs_f64()
    );
    if result.cancelled {
        println!(" Cancelled: {} folder(s) not started", result.pending_count());
    }
}

/// Prints batch events as they arrive.
struct EventRenderer {
    names: Vec<String>,
    last_percent: Option<u8>,
}

impl EventRenderer {
    fn new(names: Vec<String>) -> Self {
        Self {
            names,
            last_percent: None,
        }
    }

    fn render(&mut self, event: &BatchEvent) {
        let name = self
            .names
            .get(event.task.0)
            .map(String::as_str)
            .unwrap_or("?");

        match &event.event {
            FolderEvent::Started {
                local_path,
                destination,
            } => {
                self.last_percent = None;
                println!("==> {name}: {} -> {destination}", local_path.display());
            }
            FolderEvent::AnalysisComplete(analysis) => print_analysis(analysis),
            FolderEvent::Progress(ProgressEvent::Percent {
                percent,
                speed,
                eta,
            }) => {
                if self.last_percent != Some(*percent) {
                    self.last_percent = Some(*percent);
                    let mut line = format!("  uploading {percent:>3}%");
                    if !speed.is_empty() {
                        line.push_str(&format!(", {speed}"));
                    }
                    if !eta.is_empty() {
                        line.push_str(&format!(", ETA {eta}"));
                    }
                    println!("{line}");
                }
            }
            FolderEvent::Progress(ProgressEvent::RawLine { line }) => {
                tracing::info!(folder = name, "{line}");
            }
            FolderEvent::TransferComplete(outcome) => println!("  upload {outcome}"),
            FolderEvent::VerifyComplete(verdict) => println!("  {verdict}"),
            FolderEvent::DeleteProgress { percent, message } => {
                if *percent < 100 {
                    println!("  {message}");
                }
            }
            FolderEvent::FolderComplete(report) => println!("  moved: {}", report.summary()),
            FolderEvent::FolderFailed { state, reason } => {
                println!("  NOT MOVED ({state}): {reason}");
            }
        }
    }
}

/// Ask a yes/no question on the terminal.
fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .wrap_err("Failed to read answer")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Format bytes as a human-readable size.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to a maximum length, adding "..." if needed.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
