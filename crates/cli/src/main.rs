//! RigChat CLI entry point.
//!
//! Commands:
//! - `init`       Write the default config
//! - `chat`       Interactive chat or single-message mode
//! - `history`    Page through a session's messages
//! - `end`        End a session
//! - `escalate`   Hand a session to a human agent
//! - `feedback`   Rate a session
//! - `knowledge`  Import or search knowledge entries
//! - `doctor`     Check config, storage and provider

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "rigchat",
    about = "RigChat: PC-build assistant chat pipeline",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing config.toml
        #[arg(long)]
        force: bool,
    },

    /// Chat with the assistant
    Chat {
        /// Continue an existing session (or open one under this id)
        #[arg(short, long)]
        session: Option<String>,

        /// Print the reply as it is generated
        #[arg(long)]
        stream: bool,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Attach a user id to new sessions
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Show a session's message history
    History {
        session: String,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// End a session
    End { session: String },

    /// Hand a session over to a human agent
    Escalate { session: String },

    /// Submit feedback for a session
    Feedback {
        session: String,

        /// Rating from 1 to 5
        #[arg(short, long)]
        rating: Option<u8>,

        #[arg(long)]
        helpful: Option<bool>,

        #[arg(long)]
        resolved: Option<bool>,

        #[arg(short, long)]
        comments: Option<String>,
    },

    /// Diagnose config, storage and provider
    Doctor,

    /// Manage the knowledge base
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },
}

#[derive(Subcommand)]
enum KnowledgeAction {
    /// Import entries from a JSON array file
    Import { file: std::path::PathBuf },

    /// Search the knowledge base the way a chat turn would
    Search {
        query: String,

        /// Restrict to the category an intent maps to (build_help, product_inquiry, support, general)
        #[arg(short, long)]
        intent: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { force } => commands::init::run(force).await?,
        Commands::Chat {
            session,
            stream,
            message,
            user,
        } => commands::chat::run(session, stream, message, user).await?,
        Commands::History {
            session,
            page,
            limit,
        } => commands::session::history(&session, page, limit).await?,
        Commands::End { session } => commands::session::end(&session).await?,
        Commands::Escalate { session } => commands::session::escalate(&session).await?,
        Commands::Feedback {
            session,
            rating,
            helpful,
            resolved,
            comments,
        } => {
            let input = rigchat_pipeline::FeedbackInput {
                rating,
                helpful,
                resolved,
                comments,
            };
            commands::session::feedback(&session, input).await?
        }
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Knowledge { action } => match action {
            KnowledgeAction::Import { file } => commands::knowledge::import(&file).await?,
            KnowledgeAction::Search { query, intent } => {
                commands::knowledge::search(&query, intent.as_deref()).await?
            }
        },
    }

    Ok(())
}
