//! CLI command definitions and handlers

mod metrics;
mod query;
mod serve;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use starling::config::StarlingConfig;
use starling::registry::ModelRegistry;
use starling::service::Service;

/// Starling - inference, explanations and audited metrics for a tabular classifier
#[derive(Parser, Debug)]
#[command(name = "starling")]
#[command(
    version,
    about = "Serve predictions, per-feature explanations and evaluation metrics for a pre-trained classifier",
    after_help = "\
Examples:
  starling serve --artifacts ./artifacts     Serve the HTTP API
  starling predict request.json              Predict one JSON request
  echo '{\"features\":{\"a\":1}}' | starling predict
  starling batch rows.json                   Predict a JSON array of rows
  starling metrics                           Summarise the held-out metrics
  starling metrics --format json             Full metrics document
  starling sample --count 3                  Print demonstration rows
  starling inspect                           Show the loaded model version"
)]
pub struct Cli {
    /// Artifact directory (overrides config and environment)
    #[arg(long, global = true)]
    pub artifacts: Option<PathBuf>,

    /// Config file (default: ./starling.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the JSON API over HTTP
    Serve {
        /// Listen host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Listen port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Predict one request: {"features": {...}, "threshold"?, "top_k"?}
    Predict {
        /// Request file ("-" or omitted: stdin)
        input: Option<PathBuf>,

        /// Decision threshold in (0, 1)
        #[arg(long)]
        threshold: Option<f64>,

        /// Number of explanation factors
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Predict a JSON array of rows
    Batch {
        /// Batch file ("-" or omitted: stdin)
        input: Option<PathBuf>,
    },

    /// Print the held-out evaluation metrics
    Metrics {
        /// Output format: text or json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Print demonstration samples
    Sample {
        /// How many samples to draw
        #[arg(long, default_value = "1")]
        count: usize,
    },

    /// Show metadata and provenance of the model version
    Inspect,
}

/// Load configuration and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<StarlingConfig> {
    let mut config = StarlingConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.artifacts {
        config.artifacts_dir = dir.clone();
    }
    if let Commands::Serve { host, port } = &cli.command {
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }
    Ok(config)
}

/// Load the configured model version and wrap it in a service.
fn open_service(config: StarlingConfig) -> Result<Service> {
    let dir = config.artifacts_dir.clone();
    let registry = Arc::new(ModelRegistry::new(config));
    registry
        .reload(Some(dir.as_path()))
        .with_context(|| format!("Failed to load model artifacts from {}", dir.display()))?;
    Ok(Service::new(registry))
}

pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let (host, port) = (config.server.host.clone(), config.server.port);
    let service = open_service(config)?;

    match cli.command {
        Commands::Serve { .. } => serve::run(service, &host, port),
        Commands::Predict {
            input,
            threshold,
            top_k,
        } => query::predict(&service, input.as_deref(), threshold, top_k),
        Commands::Batch { input } => query::batch(&service, input.as_deref()),
        Commands::Metrics { format } => metrics::run(&service, &format),
        Commands::Sample { count } => query::sample(&service, count),
        Commands::Inspect => query::inspect(&service),
    }
}
