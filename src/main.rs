//! # DocuMentor CLI (`documentor`)
//!
//! Ask questions about your PDF course material from the terminal or over
//! HTTP.
//!
//! ## Usage
//!
//! ```bash
//! documentor --config ./config/documentor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `documentor init` | Create the persisted index directory and schema |
//! | `documentor ingest` | Load and index the PDFs in a directory |
//! | `documentor ask "<question>"` | Answer one question |
//! | `documentor chat` | Interactive conversation |
//! | `documentor serve` | Start the HTTP API |
//! | `documentor reset` | Delete the persisted index and uploaded files |
//! | `documentor completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Index a folder of lecture notes and ask a question
//! documentor ask "What is opportunity cost?" --dir ./documents --sources
//!
//! # Conversation with follow-up questions
//! documentor chat --dir ./documents
//! ```

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

use documentor::progress::ProgressMode;
use documentor::session::{self, Session};
use documentor::{config, db, logging, repl, server};

/// DocuMentor: a conversational study assistant grounded in your PDFs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without one, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "documentor",
    about = "DocuMentor: ask questions about your PDF documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/documentor.toml`. A missing file at the default
    /// location falls back to built-in defaults.
    #[arg(long, global = true, default_value = "./config/documentor.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Ingestion progress output on stderr.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the persisted index directory and schema.
    ///
    /// Idempotent. Does nothing useful when `storage.persist_dir` is unset.
    Init,

    /// Load and index every PDF in a directory.
    ///
    /// Replaces any previously built index. Requires `storage.persist_dir`
    /// and `storage.persist_parents = true` so later commands can use it.
    Ingest {
        /// Directory to ingest (defaults to `documents.dir`).
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Answer a single question.
    Ask {
        /// The question.
        question: String,

        /// Ingest this directory first.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Also print the retrieved passages.
        #[arg(long)]
        sources: bool,
    },

    /// Interactive conversation on stdin/stdout.
    Chat {
        /// Ingest this directory before starting.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Delete the persisted index and the upload directory.
    Reset,

    /// Print shell completions.
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "documentor", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_or_default(&cli.config)?;
    let progress: ProgressMode = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => match db::open_index(&cfg.storage).await? {
            Some(pool) => {
                pool.close().await;
                let path = cfg.storage.db_path().unwrap_or_default();
                println!("Index initialized at {}", path.display());
            }
            None => println!("storage.persist_dir is not set; the index is kept in memory."),
        },
        Commands::Ingest { dir } => {
            if !cfg.storage.survives_restart() {
                anyhow::bail!(
                    "an index built by `ingest` would not survive this process: set \
                     storage.persist_dir and storage.persist_parents = true, or use \
                     `ask --dir` / `chat --dir` to ingest and ask in one run"
                );
            }
            let mut session = Session::open(cfg).await?;
            session.set_progress(progress.reporter());
            let stats = session.ingest_dir(dir.as_deref()).await?;
            println!(
                "Ingested {} page(s): {} parent segment(s), {} child segment(s).",
                stats.documents, stats.parents, stats.children
            );
            if stats.childless_parents > 0 {
                println!(
                    "{} parent segment(s) had no searchable text.",
                    stats.childless_parents
                );
            }
        }
        Commands::Ask {
            question,
            dir,
            sources,
        } => {
            let mut session = Session::open(cfg).await?;
            session.set_progress(progress.reporter());
            if let Some(dir) = dir {
                session.ingest_dir(Some(&dir)).await?;
            }
            if sources && session.is_ready() {
                match session.ask(&question).await {
                    Ok(response) => {
                        println!("{}", response.answer);
                        println!("\nSources:");
                        for (i, seg) in response.retrieved_context.iter().enumerate() {
                            println!(
                                "  [{}] {} (page {})",
                                i + 1,
                                seg.source().unwrap_or_else(|| "unknown".to_string()),
                                seg.page().map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to answer question");
                        println!("{}", session::ERROR_MESSAGE);
                    }
                }
            } else {
                println!("{}", session.respond(&question).await);
            }
        }
        Commands::Chat { dir } => {
            let mut session = Session::open(cfg).await?;
            session.set_progress(progress.reporter());
            if let Some(dir) = dir {
                session.ingest_dir(Some(&dir)).await?;
            }
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            repl::run(&mut session, stdin).await?;
        }
        Commands::Serve => {
            let session = Session::open(cfg).await?;
            server::run_server(session).await?;
        }
        Commands::Reset => {
            session::discard_files(&cfg)?;
            println!("Conversation, index, and uploaded documents cleared.");
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
