//! factkeeper - Curated personal-fact extraction from chat transcripts
//!
//! Command-line entry point: run the pipeline for one user or a batch,
//! reprocess rejected facts, or serve the review API.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use factkeeper::{
    api::build_app,
    config::FactKeeperConfig,
    extraction::AnthropicClient,
    pipeline::{BatchRunner, Pipeline, Reprocessor},
    review::ReviewState,
    store::open_store,
    transcript::{load_file, DirectorySource, TranscriptSource},
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "factkeeper")]
#[command(version)]
#[command(about = "Curated personal-fact extraction from chat transcripts")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FACTKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract facts for one user
    Process {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Transcript file (defaults to <input dir>/<user>.json)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Process even if the user is marked as processed
        #[arg(long)]
        force: bool,
    },

    /// Extract facts for many users
    Batch {
        /// Process even if users are marked as processed
        #[arg(long)]
        force: bool,

        /// User ids (defaults to every transcript in the input dir)
        users: Vec<String>,
    },

    /// Reprocess a rejected fact, or the flagged queue when no id is given
    Reprocess {
        /// Fact id
        record_id: Option<String>,

        /// Maximum facts to take from the flagged queue
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Serve the review API
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("factkeeper={},tower_http=info", log_level).into());
    tracing_subscriber::registry()
        .with(filter)
        .with(cli.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cli.log_json).then(tracing_subscriber::fmt::layer))
        .init();

    // Load configuration
    let config = match &cli.config {
        Some(path) => FactKeeperConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => FactKeeperConfig::default(),
    };

    match cli.command {
        Commands::Process { user, file, force } => {
            run_process(&config, &user, file, force).await?;
        }
        Commands::Batch { force, users } => {
            run_batch(&config, users, force).await?;
        }
        Commands::Reprocess { record_id, limit } => {
            run_reprocess(&config, record_id, limit).await?;
        }
        Commands::Serve { host, port } => {
            run_serve(config, host, port).await?;
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

async fn build_pipeline(config: &FactKeeperConfig) -> Result<Arc<Pipeline>> {
    let store = open_store(&config.storage)
        .await
        .context("failed to open fact store")?;
    let client = AnthropicClient::from_env(config.extraction.clone())
        .context("failed to create extraction client")?;
    Ok(Arc::new(Pipeline::new(Arc::new(client), store, config)?))
}

fn input_source(config: &FactKeeperConfig) -> Arc<dyn TranscriptSource> {
    Arc::new(DirectorySource::new(config.input.dir.clone()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_process(
    config: &FactKeeperConfig,
    user: &str,
    file: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let conversations = match file {
        Some(path) => load_file(&path).await?,
        None => input_source(config).load(user).await?,
    };
    let outcome = pipeline.process(user, &conversations, force).await?;
    match outcome.unstored_candidates() {
        Some(candidates) => print_json(candidates),
        None => print_json(&outcome.newly_stored()),
    }
}

async fn run_batch(config: &FactKeeperConfig, users: Vec<String>, force: bool) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let runner = BatchRunner::new(pipeline, input_source(config));
    let users = if users.is_empty() { None } else { Some(users) };
    let report = runner.run(users, force).await?;
    print_json(&report)
}

async fn run_reprocess(
    config: &FactKeeperConfig,
    record_id: Option<String>,
    limit: usize,
) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let reprocessor = Reprocessor::new(pipeline, input_source(config));
    match record_id {
        Some(id) => print_json(&reprocessor.reprocess(&id).await?),
        None => print_json(&reprocessor.reprocess_pending(limit).await?),
    }
}

async fn run_serve(config: FactKeeperConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let pipeline = build_pipeline(&config).await?;
    let state = ReviewState::new(pipeline, input_source(&config));
    let app = build_app(state, &config.server.cors_origins);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    tracing::info!("factkeeper review API listening on {}:{}", host, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
}

fn show_config(config: Option<&FactKeeperConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
