//! # repoark CLI - Whole-repository archives
//!
//! Command-line front end for the repoark library.
//!
//! ## Usage
//! ```bash
//! # Archive a repository (writes ./project.tar.gz, or project-1.tar.gz, ...)
//! repoark archive ./project
//!
//! # Archive to an explicit file
//! repoark archive ./project /backups/project.tar.gz
//!
//! # Bring a checkout up to date from an archive
//! repoark restore ./checkout /backups/project.tar.gz
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use repoark::{find_available_archive_name, ArkConfig, ArkError, ProgressInfo, RepoArkBuilder, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// repoark - Archive git repositories and restore them differentially
#[derive(Parser)]
#[command(name = "repoark")]
#[command(version)]
#[command(about = "Archive a git working tree with its metadata and submodules, restore it touching only changed files")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Show a progress spinner
    #[arg(long, global = true)]
    progress: bool,

    /// Print the result as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Load settings from a JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// gzip compression level (0-9)
    #[arg(long, global = true)]
    level: Option<u32>,

    /// git executable to use
    #[arg(long, global = true)]
    git: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a repository into a .tar.gz archive
    Archive {
        /// Repository to archive
        repo: PathBuf,

        /// Output file (defaults to <repo-name>.tar.gz in the current directory)
        output: Option<PathBuf>,
    },

    /// Restore an archive into a repository, skipping unchanged files
    Restore {
        /// Repository to restore into
        repo: PathBuf,

        /// Archive to restore from
        archive: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Archive { ref repo, ref output } => cmd_archive(&cli, config, repo, output.as_deref()),
        Commands::Restore { ref repo, ref archive } => cmd_restore(&cli, config, repo, archive),
    }
}

/// Merge the configuration file with command-line overrides
fn load_config(cli: &Cli) -> Result<ArkConfig> {
    let mut config = match &cli.config {
        Some(path) => ArkConfig::load(path)?,
        None => ArkConfig::default(),
    };
    if let Some(level) = cli.level {
        config.compression_level = level;
    }
    if let Some(git) = &cli.git {
        config.git_program = git.clone();
    }
    Ok(config)
}

/// Pack a repository
///
/// The archive holds tracked and untracked-non-ignored files, the complete
/// `.git` directory, and the same for every submodule.
fn cmd_archive(cli: &Cli, config: ArkConfig, repo: &Path, output: Option<&Path>) -> Result<()> {
    let ark = RepoArkBuilder::new().config(config).build()?;

    let output = match output {
        Some(path) => path.to_path_buf(),
        None => find_available_archive_name(repo, &std::env::current_dir()?)?,
    };

    if !cli.json {
        println!(
            "{} {} {} {}",
            "Archiving".blue().bold(),
            repo.display().to_string().cyan(),
            "to".blue().bold(),
            output.display().to_string().cyan()
        );
    }

    let spinner = cli.progress.then(|| spinner("Collecting files..."));
    let summary = ark.archive_with_progress(
        repo,
        &output,
        spinner.as_ref().map(|pb| move |info: ProgressInfo| report(pb, &info)),
    )?;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{} Created {}", "✓".green().bold(), summary.archive_path.display().to_string().yellow().bold());
    println!("  Files: {}", summary.files_written.to_string().cyan());
    println!("  Size: {}", repoark::utils::format_bytes(summary.bytes_written).cyan());
    if summary.roots_visited > 1 {
        println!("  Submodules: {}", (summary.roots_visited - 1).to_string().cyan());
    }
    println!("  Time: {}", format_duration(Duration::from_millis(summary.duration_ms)).to_string().cyan());

    Ok(())
}

/// Restore an archive into a repository
///
/// Files whose modification time matches the archive are left alone.
/// Untracked files that are not in the archive are deleted.
fn cmd_restore(cli: &Cli, config: ArkConfig, repo: &Path, archive: &Path) -> Result<()> {
    let ark = RepoArkBuilder::new().config(config).build()?;

    if !archive.is_file() {
        return Err(ArkError::PathNotFound {
            path: archive.to_path_buf(),
        });
    }

    if !cli.json {
        println!(
            "{} {} {} {}",
            "Restoring".blue().bold(),
            archive.display().to_string().cyan(),
            "into".blue().bold(),
            repo.display().to_string().cyan()
        );
    }

    let spinner = cli.progress.then(|| spinner("Restoring files..."));
    let result = ark.restore_with_progress(
        repo,
        archive,
        spinner.as_ref().map(|pb| move |info: ProgressInfo| report(pb, &info)),
    )?;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{} Restored {}", "✓".green().bold(), result.target_path.display().to_string().yellow().bold());
    println!("  Written: {} files", result.files_restored.to_string().cyan());
    println!("  Unchanged: {} files", result.files_skipped.to_string().cyan());
    if result.files_deleted > 0 {
        println!("  Removed: {} files", result.files_deleted.to_string().yellow());
    }
    println!("  Size: {}", repoark::utils::format_bytes(result.bytes_written).cyan());
    println!("  Time: {}", format_duration(Duration::from_millis(result.duration_ms)).to_string().cyan());

    Ok(())
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn report(pb: &ProgressBar, info: &ProgressInfo) {
    let item = info.current_item.as_deref().unwrap_or("");
    match info.percentage() {
        Some(pct) => pb.set_message(format!("[{:>3.0}%] {} {}", pct, info.operation, item)),
        None => pb.set_message(format!("{} {}", info.operation, item)),
    }
}
