//! CLI command definitions and handlers

use clap::Subcommand;
use std::path::PathBuf;

use crate::core::config::RelayConfig;

/// Commands for LLM Relay
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP API server
    Server {
        /// Bind address (default: 0.0.0.0)
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Listen port (default: 3000)
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },

    /// Run the chat pipeline once for a single message
    Chat {
        /// Message to send
        message: String,
    },

    /// Translate a text file through the translation key pool
    Translate {
        /// Input file (required)
        #[arg(short, long)]
        file: PathBuf,

        /// Output file (default: <file>_translated)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target language (default: from configuration)
        #[arg(short, long)]
        target_lang: Option<String>,
    },
}

/// Handle server command
pub async fn handle_server(host: String, port: u16, config: RelayConfig) -> anyhow::Result<()> {
    use crate::server::api::run_server;
    use tracing::info;

    info!("Starting HTTP server on {}:{}", host, port);
    println!("🚀 Server starting on http://{}:{}", host, port);

    run_server(host, port, config).await?;

    Ok(())
}

/// Handle one-shot chat command
pub async fn handle_chat(message: String, config: RelayConfig) -> anyhow::Result<()> {
    use crate::core::models::Turn;
    use crate::core::workflow::Workflow;

    let workflow = Workflow::from_config(&config)?;
    println!("🔄 Workflow: {}", workflow.describe());

    let outcome = workflow.run(vec![Turn::user(message)]).await?;

    println!("\n{}\n", outcome.response);
    println!("   Enhance: {}", outcome.stages.enhance);
    println!("   Generate: {}", outcome.stages.generate);
    println!("   Translate: {}", outcome.stages.translate);

    Ok(())
}

/// Handle file translation command
pub async fn handle_translate(
    file: PathBuf,
    output: Option<PathBuf>,
    target_lang: Option<String>,
    mut config: RelayConfig,
) -> anyhow::Result<()> {
    use crate::core::key_pool::TRANSLATE_POOL;
    use crate::core::workflow::Workflow;
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Instant;
    use tracing::info;

    let start_time = Instant::now();

    if let Some(lang) = target_lang {
        config.target_language = lang;
    }

    // Determine output path
    let output = output.unwrap_or_else(|| {
        let mut out = file.clone();
        let mut filename = file.file_name().unwrap_or_default().to_os_string();
        filename.push("_translated");
        out.set_file_name(filename);
        out
    });

    info!("Starting translation");
    info!("Input: {}", file.display());
    info!("Output: {}", output.display());
    info!("Target language: {}", config.target_language);

    let workflow = Workflow::from_config(&config)?;
    let pool = workflow
        .keys()
        .pool(TRANSLATE_POOL)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No translation keys found in {}",
                config.translate_keys_file.display()
            )
        })?;

    let content = tokio::fs::read_to_string(&file).await?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(concat!(
                "{spinner:.green} [{elapsed_precise}] ",
                "[{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})"
            ))?
            .progress_chars("=>-"),
    );

    let report = workflow
        .translator()
        .translate_with_progress(&content, workflow.translate_model(), &pool, |done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        })
        .await?;

    pb.finish_and_clear();

    tokio::fs::write(&output, &report.text).await?;

    let duration = start_time.elapsed();
    info!(
        "Completed: {}/{} chunks translated in {:?}",
        report.translated_chunks, report.total_chunks, duration
    );

    println!("\n✅ Translation completed!");
    println!(
        "   Translated: {}/{} chunks",
        report.translated_chunks, report.total_chunks
    );
    println!("   Output: {}", output.display());
    println!("   Time: {:?}", duration);

    Ok(())
}
