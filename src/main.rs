//! # Rulebook RAG CLI (`rag`)
//!
//! ## Usage
//!
//! ```bash
//! rag [--config ./config/rag.toml] [--verbose] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag check` | Report missing directories and invalid settings |
//! | `rag init [--force]` | Build the index, or update it with new and changed files |
//! | `rag stats [--json]` | Show index state, counts and size |
//! | `rag reset [--yes]` | Delete the index and the processing ledger |
//! | `rag add <files>...` | Index specific markdown files |
//! | `rag ask "<question>"` | Answer one question |
//! | `rag chat` | Interactive question loop |
//!
//! Every command exits with status 0 on success and 1 on failure.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rulebook_rag::config::{self, Config};
use rulebook_rag::index_manager::IndexManager;
use rulebook_rag::llm::OllamaCompletion;
use rulebook_rag::prerequisites::{check_prerequisites, has_errors, print_issues};
use rulebook_rag::progress::ProgressMode;
use rulebook_rag::{chat, stats};
use rulebook_rag_core::error::RagError;
use rulebook_rag_core::query::QueryMode;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Rulebook RAG: question answering over markdown rulebooks.
#[derive(Parser)]
#[command(name = "rag", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rag.toml`; built-in defaults apply when that
    /// file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline progress (info level) to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the document directory and index location are usable.
    Check,

    /// Build the index, or bring it up to date with changed files.
    Init {
        /// Delete the existing index and ledger first.
        #[arg(long)]
        force: bool,
    },

    /// Show index statistics.
    Stats {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Delete the index and the processing ledger.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// Index specific markdown files.
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Answer a single question.
    Ask {
        question: String,

        #[arg(long, value_enum, default_value = "direct")]
        mode: ModeArg,

        /// Print the answer, sources and sub-questions as JSON.
        #[arg(long)]
        json: bool,

        /// Progress events on stderr: human, json, or off.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Interactive question loop.
    Chat {
        #[arg(long, value_enum, default_value = "direct")]
        mode: ModeArg,

        /// Save the conversation to this JSON file and resume from it.
        #[arg(long)]
        session: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Direct,
    Decompose,
}

impl From<ModeArg> for QueryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Direct => QueryMode::Direct,
            ModeArg::Decompose => QueryMode::Decompose,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Human,
    Json,
    Off,
}

impl From<ProgressArg> for ProgressMode {
    fn from(p: ProgressArg) -> Self {
        match p {
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
            ProgressArg::Off => ProgressMode::Off,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<RagError>() {
                Some(RagError::IndexUnavailable) => {
                    eprintln!("Error: {}", e);
                    eprintln!("Not enough information to answer: build the index with `rag init`.");
                }
                _ => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Check => {
            let issues = check_prerequisites(&cfg);
            print_issues(&issues);
            if has_errors(&issues) {
                bail!("prerequisite check failed");
            }
        }
        Commands::Init { force } => run_init(cfg, force).await?,
        Commands::Stats { json } => {
            let manager = IndexManager::from_config(cfg)?;
            stats::run_stats(&manager, json).await?;
        }
        Commands::Reset { yes } => {
            if !yes && !confirm_reset()? {
                bail!("reset cancelled");
            }
            let manager = IndexManager::from_config(cfg)?;
            manager.reset().await?;
            println!("Index and processing ledger deleted.");
        }
        Commands::Add { files } => {
            let manager = IndexManager::from_config(cfg)?;
            let report = manager.add_specific_files(&files).await?;
            for (path, reason) in &report.skipped {
                eprintln!("skipped {}: {}", path.display(), reason);
            }
            if report.added.is_empty() {
                bail!("no files were added");
            }
            println!(
                "Added {} file(s), {} chunk(s): {}",
                report.added.len(),
                report.chunks,
                report.added.join(", ")
            );
        }
        Commands::Ask {
            question,
            mode,
            json,
            progress,
        } => {
            let llm = OllamaCompletion::new(&cfg.llm)?;
            let manager = IndexManager::from_config(cfg)?;
            let progress = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            chat::run_ask(&manager, &llm, &question, mode.into(), json, progress).await?;
        }
        Commands::Chat { mode, session } => {
            let llm = OllamaCompletion::new(&cfg.llm)?;
            let manager = IndexManager::from_config(cfg)?;
            chat::run_chat(
                &manager,
                &llm,
                mode.into(),
                session.as_deref(),
                ProgressMode::default_for_tty(),
            )
            .await?;
        }
    }

    Ok(())
}

async fn run_init(cfg: Config, force: bool) -> Result<()> {
    let issues = check_prerequisites(&cfg);
    if !issues.is_empty() {
        print_issues(&issues);
    }
    if has_errors(&issues) {
        bail!("prerequisite check failed; fix the errors above and retry");
    }

    let manager = IndexManager::from_config(cfg)?;
    if force {
        manager.reset().await?;
        println!("Existing index removed.");
    }

    match manager.init_or_update().await? {
        Some(_) => println!("Index ready."),
        None => println!("No markdown files to index."),
    }
    stats::run_stats(&manager, false).await
}

fn confirm_reset() -> Result<bool> {
    println!("This deletes the index and the processing ledger.");
    println!("Type RESET to confirm:");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim() == "RESET")
}
