//! # ytchat CLI
//!
//! ## Usage
//!
//! ```bash
//! ytchat --config ./config/ytchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ytchat init` | Create the SQLite database and run schema migrations |
//! | `ytchat serve` | Start the HTTP API |
//! | `ytchat videos list` | List registered videos and their segments |
//! | `ytchat videos add <url>` | Register a video and wait for its analysis |
//! | `ytchat videos remove <id>` | Remove a video |
//! | `ytchat ask "<question>"` | Ask a question |
//! | `ytchat history` | Show recent questions and answers |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use ytchat::config::ConfigHandle;
use ytchat::{commands, logging, migrate, server};

/// Ask questions about registered videos.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ytchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ytchat",
    about = "Register videos, analyse them into timestamped segments, and ask questions about them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ytchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Start the HTTP API server.
    ///
    /// Binds to `[server].bind`. Reloads the config file on SIGHUP.
    Serve,

    /// Manage registered videos.
    Videos {
        #[command(subcommand)]
        action: VideoAction,
    },

    /// Ask a question about the registered videos.
    Ask {
        /// The question text.
        question: String,
    },

    /// Show recent questions and answers, newest first.
    History {
        /// Number of exchanges to show (defaults to `[history].default_limit`).
        #[arg(long)]
        limit: Option<i64>,
    },
}

#[derive(Subcommand)]
enum VideoAction {
    /// List registered videos with their segments.
    List,
    /// Register a video by URL and wait for analysis to finish.
    Add {
        /// Watch-page or short-link URL.
        url: String,
    },
    /// Remove a video, its segments, and citations to it.
    Remove {
        /// Internal video id (see `videos list`).
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Arc::new(ConfigHandle::load(&cli.config)?);
    logging::init_tracing(&config.snapshot().log.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config.snapshot()).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(config).await?;
        }
        Commands::Videos { action } => match action {
            VideoAction::List => commands::run_videos_list(config).await?,
            VideoAction::Add { url } => commands::run_videos_add(config, &url).await?,
            VideoAction::Remove { id } => commands::run_videos_remove(config, id).await?,
        },
        Commands::Ask { question } => {
            commands::run_ask(config, &question).await?;
        }
        Commands::History { limit } => {
            commands::run_history(config, limit).await?;
        }
    }

    Ok(())
}
