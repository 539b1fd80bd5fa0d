//! AgentDesk - drive streaming content agents from the terminal
//!
#![doc = "Main entry point for the AgentDesk application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agentdesk::cli::{Cli, Commands, ConversationCommand, DocsCommand};
use agentdesk::commands;
use agentdesk::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/agentdesk.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { agent: _, srt } => {
            // `--agent` was folded into chat.default_agent by Config::load
            tracing::info!("Starting interactive chat mode");
            if let Some(doc) = &srt {
                tracing::debug!("Using reference document: {}", doc);
            }
            commands::chat::run_chat(config, srt).await?;
            Ok(())
        }
        Commands::Agents => {
            commands::agents::print_catalogue();
            Ok(())
        }
        Commands::Docs { command } => match command {
            DocsCommand::List => commands::docs::list_documents(&config).await,
            DocsCommand::Upload { path } => {
                tracing::info!("Uploading {}", path.display());
                commands::docs::upload_document(&config, &path).await
            }
        },
        Commands::Conversations { command } => match command {
            ConversationCommand::List => {
                commands::conversations::list_conversations(&config).await
            }
            ConversationCommand::Show { id } => {
                commands::conversations::show_conversation(&config, &id).await
            }
            ConversationCommand::Delete { id } => {
                commands::conversations::delete_conversation(&config, &id).await
            }
        },
        Commands::Health => {
            commands::health::check_health(&config).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "agentdesk=debug"
    } else {
        "agentdesk=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
