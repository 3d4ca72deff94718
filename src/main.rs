//! Main entry point for LLM Relay CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llm_relay::cli::commands::{self, Commands};
use llm_relay::RelayConfig;

/// LLM Relay - multi-provider chat pipeline with key rotation and model fallback
#[derive(Parser, Debug)]
#[command(name = "llm-relay", version, about, long_about = None)]
struct Args {
    /// Config file (default: relay.{toml,json,yaml} in the working directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Primary API key (optional, defaults to ANTHROPIC_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    let crate_target = env!("CARGO_PKG_NAME").replace('-', "_");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}={}", crate_target, log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = RelayConfig::load(args.config.as_deref())?;

    // Override config with CLI args if provided
    if let Some(api_key) = args.api_key {
        config.primary_api_key = Some(api_key);
    }

    // Execute command
    match args.command {
        Some(Commands::Server { host, port }) => {
            commands::handle_server(host, port, config).await?;
        }
        Some(Commands::Chat { message }) => {
            commands::handle_chat(message, config).await?;
        }
        Some(Commands::Translate {
            file,
            output,
            target_lang,
        }) => {
            commands::handle_translate(file, output, target_lang, config).await?;
        }
        None => {
            println!("Please specify a command. Use --help for more information.");
        }
    }

    Ok(())
}
