//! SideChat CLI — operator entry point.
//!
//! Commands:
//! - `sweep`     — Remove expired merged knowledge (once or on an interval)
//! - `knowledge` — List or show merged knowledge for a user
//! - `export`    — Render a conversation's side discussions as markdown
//! - `config`    — Show, validate or initialize configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "sidechat",
    about = "SideChat — branch, merge and reuse side discussions",
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
    /// Remove expired merged knowledge
    Sweep {
        /// Keep running, sweeping every `store.sweep_interval_secs`
        #[arg(short, long)]
        watch: bool,
    },

    /// Inspect merged knowledge
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeCommands,
    },

    /// Export a conversation's side discussions as markdown
    Export {
        /// Owning user
        #[arg(short, long)]
        user: String,

        /// Conversation to export
        #[arg(short, long)]
        conversation: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum KnowledgeCommands {
    /// List a conversation's knowledge, or the cross-conversation index
    List {
        #[arg(short, long)]
        user: String,

        /// Conversation scope; omit for the cross-conversation index
        #[arg(short, long)]
        conversation: Option<String>,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one record as a transcript block
    Show {
        #[arg(short, long)]
        user: String,

        /// Knowledge id (mk_...)
        id: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
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

    match cli.command {
        Commands::Sweep { watch } => commands::sweep::run(watch).await?,
        Commands::Knowledge { action } => match action {
            KnowledgeCommands::List {
                user,
                conversation,
                json,
            } => commands::knowledge::list(&user, conversation.as_deref(), json).await?,
            KnowledgeCommands::Show { user, id } => commands::knowledge::show(&user, &id).await?,
        },
        Commands::Export {
            user,
            conversation,
            output,
        } => commands::export::run(&user, &conversation, output.as_deref()).await?,
        Commands::Config { action } => match action {
            ConfigCommands::Show => commands::config_cmd::show().await?,
            ConfigCommands::Path => commands::config_cmd::path().await?,
            ConfigCommands::Validate => commands::config_cmd::validate().await?,
            ConfigCommands::Init { force } => commands::config_cmd::init(force).await?,
        },
    }

    Ok(())
}
