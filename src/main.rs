//! logship - tail a log directory and ship its records.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use logship::config::{ConfigError, ConfigLoader, ShipperConfig};
use logship::pipeline::{self, PipelineError};
use logship::reader::{CheckpointError, FileCheckpoint, FileTailer, ReaderError, TailerOptions};
use logship::sender::{HttpDeliveryClient, Sender, SenderError, SenderOptions};

#[derive(Parser)]
#[command(
    name = "logship",
    about = "Tail a log directory and ship JSON records to a repository",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ship records until interrupted.
    Run {
        /// Config file. Defaults to ./logship.toml, then the user config dir.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate the configuration and print it with defaults filled in.
    CheckConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Sender(#[from] SenderError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Cannot render config: {0}")]
    Render(#[from] toml::ser::Error),
}

impl CliError {
    /// Exit status: 2 for a bad configuration, 1 for runtime failures.
    fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Reader(e) if e.is_configuration() => 2,
            _ => 1,
        }
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<ShipperConfig, ConfigError> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    loader.load()
}

async fn run(config: ShipperConfig) -> Result<(), CliError> {
    let checkpoint = FileCheckpoint::open(config.checkpoint_dir())?;
    let options = TailerOptions::from_config(&config.reader)?;
    let tailer = FileTailer::open(&config.reader.log_path, options, checkpoint)?;

    let client = HttpDeliveryClient::from_config(&config.sender)?;
    let sender = Sender::new(SenderOptions::from_config(&config.sender)?, Arc::new(client));

    tracing::info!(
        name = %config.name,
        dir = %tailer.dir().display(),
        repo = %sender.repo(),
        "Starting logship"
    );
    if let Err(e) = sender.ensure_repo().await {
        tracing::warn!(repo = %sender.repo(), error = %e, "Repository not ready, will retry on send");
    }

    let cancel = CancellationToken::new();
    let refresh = sender.spawn_schema_refresh(
        Duration::from_secs(config.sender.schema_refresh_secs.max(1)),
        cancel.clone(),
    );
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
            }
            cancel.cancel();
        });
    }

    let result = pipeline::run(tailer, sender, &config.pipeline, cancel.clone()).await;
    cancel.cancel();
    let _ = refresh.await;

    let stats = result?;
    tracing::info!(
        lines_read = stats.lines_read,
        records_delivered = stats.records_delivered,
        "logship stopped"
    );
    Ok(())
}

fn check_config(config: &ShipperConfig) -> Result<(), CliError> {
    TailerOptions::from_config(&config.reader)?;
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run { config } => match load_config(config) {
            Ok(config) => run(config).await,
            Err(e) => Err(e.into()),
        },
        Commands::CheckConfig { config } => match load_config(config) {
            Ok(config) => check_config(&config),
            Err(e) => Err(e.into()),
        },
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "logship failed");
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}
