//! Relay Server Binary
//!
//! Runs the runtime as a standalone server (`serve`) or hosts a single
//! built-in tool as a worker child process (`worker`). The `worker`
//! subcommand is normally spawned by the supervisor, not by hand.

use clap::{Parser, Subcommand};
use relay::tools::{build_tool, worker};
use relay::{MainConfig, Runtime};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "relay-server", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the runtime against a JSON configuration file.
    Serve {
        /// Path to the configuration file.
        #[arg(long, default_value = "relay.json")]
        config: PathBuf,
    },
    /// Host one built-in tool over stdin/stdout frames.
    Worker {
        /// Tool name, for log context.
        #[arg(long)]
        name: String,
        /// Which built-in tool to host.
        #[arg(long)]
        kind: String,
        /// Tool settings as a JSON object.
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for API keys before anything reads the environment.
    dotenvy::dotenv().ok();

    match Cli::parse().command {
        Command::Serve { config } => serve(config).await,
        Command::Worker { name, kind, config } => run_worker(name, kind, config).await,
    }
}

async fn serve(config: PathBuf) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting relay");

    let config = MainConfig::from_file(&config)?;
    let mut runtime = Runtime::new(config);
    runtime.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    runtime.stop().await?;

    Ok(())
}

async fn run_worker(name: String, kind: String, config: Option<String>) -> anyhow::Result<()> {
    // Stdout carries the frame channel; logs must go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings: Map<String, Value> = match config {
        Some(raw) => serde_json::from_str(&raw)?,
        None => Map::new(),
    };

    tracing::info!("worker \"{name}\" hosting a \"{kind}\" tool");

    let tool = build_tool(&kind, &settings)?;
    worker::run_stdio(tool).await?;

    Ok(())
}
