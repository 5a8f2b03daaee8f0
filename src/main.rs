//! Solar telemetry publisher - main entry point

use clap::{Parser, Subcommand};
use solar_telemetry::config::{ExhaustionPolicy, PublisherConfig};
use solar_telemetry::lifecycle_span;
use solar_telemetry::observability::logging::parse_spans_flag;
use solar_telemetry::observability::{init_default_logging, init_logging, LogFormat};
use solar_telemetry::{MqttClient, PublisherError, PublisherLifecycle, PublisherResult, RunOutcome};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn, Instrument, Level};

/// Default config locations, tried in order
const DEFAULT_CONFIG_PATHS: &[&str] = &["solar-publisher.toml", "config/solar-publisher.toml"];

/// Simulated solar-panel telemetry publisher
#[derive(Parser)]
#[command(name = "solar-publisher")]
#[command(about = "Publish simulated solar-panel readings to an MQTT broker")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace); ignored when LOG_LEVEL is set
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and publish until stopped
    Run,
    /// Validate configuration
    Config {
        /// Print the effective configuration as TOML
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_cli_logging(cli.verbose);

    info!(
        "Starting solar telemetry publisher v{}",
        env!("CARGO_PKG_VERSION")
    );

    let result = match load_configuration(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Run => run_publisher(config).await,
            Commands::Config { show } => handle_config_command(&config, show),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

/// `-v`/`-vv` raise the level unless LOG_LEVEL is set explicitly
fn init_cli_logging(verbose: u8) {
    if verbose == 0 || std::env::var_os("LOG_LEVEL").is_some() {
        init_default_logging();
        return;
    }

    let level = if verbose > 1 { Level::TRACE } else { Level::DEBUG };
    let format = LogFormat::parse(&std::env::var("LOG_FORMAT").unwrap_or_default());
    let include_spans = parse_spans_flag(&std::env::var("LOG_SPANS").unwrap_or_default());
    init_logging(level, format, include_spans);
}

fn load_configuration(config_path: Option<&Path>) -> PublisherResult<PublisherConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(PublisherConfig::load_from_file(path)?);
    }

    for candidate in DEFAULT_CONFIG_PATHS {
        let path = Path::new(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(PublisherConfig::load_from_file(path)?);
        }
    }

    info!("No configuration file found, using defaults and environment");
    Ok(PublisherConfig::from_env()?)
}

async fn run_publisher(config: PublisherConfig) -> PublisherResult<()> {
    let on_exhausted = config.publisher.on_exhausted;
    let transport = Arc::new(MqttClient::new(&config)?);
    info!(client_id = %transport.client_id(), "MQTT client created");

    let lifecycle = PublisherLifecycle::new(config, transport.clone());
    lifecycle
        .start()
        .instrument(lifecycle_span!(phase = "startup"))
        .await?;

    let outcome = lifecycle.run_until(shutdown_signal()).await;
    lifecycle.shutdown().await;

    let result = match outcome? {
        RunOutcome::Shutdown => Ok(()),
        RunOutcome::Exhausted { attempts, summary } => {
            info!(
                published = summary.published,
                skipped = summary.skipped,
                "Publication stopped after reconnect exhaustion"
            );
            match on_exhausted {
                ExhaustionPolicy::Exit => Err(PublisherError::reconnect_exhausted(attempts)),
                ExhaustionPolicy::Idle => {
                    warn!("Publication stopped; idling until SIGINT or SIGTERM");
                    shutdown_signal().await;
                    Ok(())
                }
            }
        }
    };

    if let Err(e) = transport.disconnect().await {
        warn!("Error during disconnect: {}", e);
    }
    result
}

fn handle_config_command(config: &PublisherConfig, show: bool) -> PublisherResult<()> {
    if show {
        let rendered = toml::to_string_pretty(config)
            .map_err(|e| PublisherError::internal(format!("failed to render config: {e}")))?;
        println!("{rendered}");
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let (mut sigint, mut sigterm) = match (
        signal::unix::signal(signal::unix::SignalKind::interrupt()),
        signal::unix::signal(signal::unix::SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        _ => {
            warn!("Unix signal handlers unavailable, falling back to Ctrl-C");
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }
}
