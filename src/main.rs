mod change;
mod config;
mod context;
mod edit;
mod llm;
mod patch;
mod pipeline;
mod publish;
mod webhook;
mod workspace;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// issue-fixer: webhook service that receives repository-issue events,
/// asks an LLM for a fix, applies it to a disposable clone, and opens a
/// pull request with the result.
#[derive(Parser, Debug)]
#[command(name = "issue-fixer", version, about)]
struct Cli {
    /// Address to listen on for webhook deliveries
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Configuration file path (defaults to .issue-fixer.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = config::Config::load(cli.config.as_deref())?;
    config.validate()?;

    let app = webhook::router(Arc::new(config));
    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    info!(addr = %cli.bind, "listening for webhook deliveries");
    axum::serve(listener, app).await?;

    Ok(())
}
