//! Helmsman CLI: the main entry point.
//!
//! Commands:
//! - `init`          : Write the default config and create data directories
//! - `chat`          : Interactive chat or single-message mode
//! - `conversations` : List a user's conversations
//! - `history`       : Print a conversation transcript
//! - `stats`         : Show conversation statistics
//! - `archive`       : Archive a conversation
//! - `delete`        : Delete a conversation and its messages
//! - `tools`         : List the registered tools
//! - `audit`         : Show tool execution records

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "helmsman",
    about = "Helmsman - bounded tool-calling orchestrator for LLM assistants",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.helmsman/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// User the conversations belong to
    #[arg(short, long, global = true, env = "HELMSMAN_USER", default_value = "local")]
    user: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration and create data directories
    Init,

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Project whose data the tools may use
        #[arg(short, long)]
        project: Option<String>,
    },

    /// List conversations
    Conversations {
        /// Include archived conversations
        #[arg(short, long)]
        all: bool,
    },

    /// Print the messages of a conversation
    History {
        conversation: String,

        /// Show what the model would be sent instead of the raw transcript
        #[arg(long)]
        model_view: bool,
    },

    /// Show statistics of a conversation
    Stats { conversation: String },

    /// Archive a conversation; it stays readable but accepts no new messages
    Archive { conversation: String },

    /// Delete a conversation and all its messages
    Delete { conversation: String },

    /// List the registered tools
    Tools,

    /// Show tool execution audit records
    Audit {
        /// Only records of this conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Only records of this tool
        #[arg(long)]
        tool: Option<String>,

        /// Show at most this many (newest) records
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let user = cli.user.as_str();
    let config = || runtime::load_config(cli.config.as_deref());

    match cli.command {
        Commands::Init => commands::init::run(cli.config.as_deref()).await?,
        Commands::Chat {
            message,
            conversation,
            project,
        } => commands::chat::run(&config()?, user, message, conversation, project).await?,
        Commands::Conversations { all } => {
            commands::conversations::list(&config()?, user, all).await?
        }
        Commands::History {
            conversation,
            model_view,
        } => {
            commands::conversations::history(&config()?, user, &conversation, model_view).await?
        }
        Commands::Stats { conversation } => {
            commands::conversations::stats(&config()?, user, &conversation).await?
        }
        Commands::Archive { conversation } => {
            commands::conversations::archive(&config()?, user, &conversation).await?
        }
        Commands::Delete { conversation } => {
            commands::conversations::delete(&config()?, user, &conversation).await?
        }
        Commands::Tools => commands::tools::run(),
        Commands::Audit {
            conversation,
            tool,
            limit,
        } => commands::audit::run(&config()?, user, conversation, tool, limit).await?,
    }

    Ok(())
}
