//! chat-relay daemon - streams context-augmented chat completions over SSE

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chat_relay::config::Config;
use chat_relay::error::Result;
use chat_relay::server::{AppState, RelayServer};

/// chat-relay - Streams context-augmented LLM chat completions over SSE
#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Streams context-augmented LLM chat completions over SSE")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the relay server (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chat_relay=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    if let Some(path) = config_path {
        tracing::info!("Loading config from: {}", path.display());
        return Config::from_file(&path);
    }

    let default_paths = [
        dirs::home_dir().map(|h| h.join(".chat-relay").join("config.toml")),
        dirs::config_dir().map(|c| c.join("chat-relay").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            tracing::info!("Loading config from: {}", path.display());
            return Config::from_file(path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting chat-relay");

    let config = load_config(config_path)?;
    tracing::debug!("Config loaded: {:?}", config);

    let state = AppState::from_config(config)?;
    RelayServer::new(state).serve().await?;

    tracing::info!("chat-relay stopped");
    Ok(())
}
