//! ATSD Finder CLI
//!
//! Serves the Graphite-compatible API, or runs a single find / fetch
//! against ATSD from the command line.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atsd_finder::api::routes::render::render_targets;
use atsd_finder::api::timespec::parse_time;
use atsd_finder::api::{serve, AppState};
use atsd_finder::backend::{AtsdBackend, AtsdClient};
use atsd_finder::config::{generate_default_config, Config};
use atsd_finder::finder::{FindQuery, Finder};
use atsd_finder::reader::ReaderContext;
use atsd_finder::series::TimeRange;

#[derive(Parser)]
#[command(name = "atsd-finder")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Graphite namespace finder for Axibase Time Series Database")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations, then environment)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Override [api] host
        #[arg(long)]
        host: Option<String>,
        /// Override [api] port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List nodes matching a pattern
    Find {
        /// Dotted pattern, e.g. "entities.n.*"
        pattern: String,
    },

    /// Fetch series for every leaf matching a pattern
    Fetch {
        pattern: String,
        /// Start: "now", "-2h", "now-1d" or unix seconds
        #[arg(long, default_value = "-1h")]
        from: String,
        /// End, same forms as --from
        #[arg(long, default_value = "now")]
        until: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let config = generate_default_config();
        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, &config)?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", config),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_tracing(&config);

    match cli.command {
        Commands::Serve { host, port } => {
            let mut api = config.api.clone();
            if let Some(host) = host {
                api.host = host;
            }
            if let Some(port) = port {
                api.port = port;
            }

            tracing::info!("Starting ATSD finder v{}", env!("CARGO_PKG_VERSION"));
            tracing::info!(atsd = %config.atsd.url, views = config.views.len(), "Configured");

            let finder = Arc::new(build_finder(&config)?);
            serve(AppState::new(finder, api.clone()), &api).await?;
        }
        Commands::Find { pattern } => {
            let finder = build_finder(&config)?;
            for node in finder.resolve(&FindQuery::new(pattern)).await? {
                let marker = if node.is_leaf() { "leaf" } else { "branch" };
                println!("{:<6} {}", marker, node.path());
            }
        }
        Commands::Fetch {
            pattern,
            from,
            until,
        } => {
            let finder = build_finder(&config)?;
            let now = Utc::now().timestamp_millis();
            let start = parse_time(&from, now).map_err(anyhow::Error::msg)?;
            let end = parse_time(&until, now).map_err(anyhow::Error::msg)?;
            let range = TimeRange::new(start, end)?;

            let series = render_targets(&finder, &[pattern], range).await;
            println!("{}", serde_json::to_string_pretty(&series)?);
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("atsd_finder={},tower_http=debug", config.logging.level).into()
    });
    let json = config.logging.format.eq_ignore_ascii_case("json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

fn build_finder(config: &Config) -> anyhow::Result<Finder> {
    config.validate()?;

    let client = AtsdClient::new(config.atsd.client_config())
        .context("failed to build ATSD client")?;
    let backend: Arc<dyn AtsdBackend> = Arc::new(client);
    let context = ReaderContext::new(
        backend,
        config.retention_policy(),
        config.finder.cache_ttl_ms,
    );

    Ok(Finder::new(
        config.tree_schema()?,
        config.view_schemas()?,
        context,
    )?)
}
