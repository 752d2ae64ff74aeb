//! `moneydesk` command-line entry point.

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use moneydesk_rs::config::MoneyDeskConfig;
use moneydesk_rs::core::IntentClassifier;
use moneydesk_rs::protocol::{ChatRequest, Tier, UserContext};
use std::path::PathBuf;
use std::sync::Arc;

/// Command-line options for the MoneyDesk support router.
#[derive(Parser)]
#[command(name = "moneydesk", version)]
struct Cli {
    /// Extra moneydesk.json5 layers, applied after the discovered ones
    #[arg(long, global = true)]
    config: Vec<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve,
    /// Route a single message and print the JSON reply
    Ask {
        message: String,
        /// User id the message is sent as
        #[arg(long, default_value = "cli")]
        user: String,
        /// Subscription tier (free, basic, plus, pro)
        #[arg(long, default_value_t = Tier::Free)]
        tier: Tier,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Print the intent classification of a message
    Classify { message: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    moneydesk_rs::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Classify { message } => {
            let classifier = IntentClassifier::new().context("failed to build classifier")?;
            let result = classifier.classify(&message);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Ask {
            message,
            user,
            tier,
            conversation,
        } => {
            let config = load_config(&cli.config)?;
            let router = moneydesk_rs::build_router(&config)?;
            let reply = router
                .route(
                    &UserContext::new(user, tier),
                    ChatRequest {
                        message,
                        conversation_id: conversation,
                    },
                )
                .await
                .map_err(|err| anyhow::anyhow!("{}", err.public_message()))?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        Command::Serve => {
            let config = load_config(&cli.config)?;
            let router = Arc::new(moneydesk_rs::build_router(&config)?);
            info!("router ready; launching server");
            moneydesk_rs::server::serve(router, &config.server)
                .await
                .map_err(|err| anyhow::anyhow!("http server failed: {err}"))?;
        }
    }
    Ok(())
}

fn load_config(runtime_paths: &[PathBuf]) -> anyhow::Result<MoneyDeskConfig> {
    let cwd = std::env::current_dir().context("failed to resolve current working directory")?;
    info!(
        "loading config (cwd={}, runtime_layers={})",
        cwd.display(),
        runtime_paths.len()
    );
    moneydesk_rs::load_config(&cwd, runtime_paths)
}
