use std::path::Path;

use anyhow::Result;
use clap::Parser;

use tempo_common::config::CoordConfig;
use tempo_common::types::{Column, ColumnType, Dataset, DatasetRef};
use tempo_coord::cluster::InProcessCluster;
use tempo_coord::membership::SeedsClient;

#[derive(Parser, Debug)]
#[command(name = "tempodb", about = "TempoDB — distributed time-series query coordinator")]
struct Cli {
    /// Config file path.
    #[arg(short, long, default_value = "tempo.toml")]
    config: String,

    /// Dataset served by this coordinator (overrides config).
    #[arg(long, default_value = "metrics")]
    dataset: String,

    /// Number of in-process nodes (>1 simulates a multi-node cluster).
    #[arg(long, default_value = "1")]
    nodes: usize,

    /// Number of shards (overrides config).
    #[arg(long)]
    shards: Option<u64>,

    /// Wait for the seeds endpoint before starting.
    #[arg(long)]
    wait_for_seeds: bool,

    /// Print the default configuration as TOML and exit.
    #[arg(long)]
    print_default_config: bool,
}

/// Initialize the global tracing subscriber with structured logging.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tempo=debug"));
    let fmt_layer = fmt::layer().with_target(true).with_thread_ids(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn load_config(path: &str) -> CoordConfig {
    if Path::new(path).exists() {
        match std::fs::read_to_string(path).map_err(anyhow::Error::from).and_then(|s| {
            toml::from_str::<CoordConfig>(&s).map_err(anyhow::Error::from)
        }) {
            Ok(config) => {
                tracing::info!(path, "loaded config");
                return config;
            }
            Err(e) => {
                tracing::warn!(path, "failed to load config, using defaults: {}", e);
            }
        }
    }
    CoordConfig::default()
}

fn demo_dataset(name: &str) -> Result<Dataset> {
    Ok(Dataset::new(
        DatasetRef::new(name),
        vec![
            Column::new(0, "series", ColumnType::String),
            Column::new(1, "t", ColumnType::Timestamp),
            Column::new(2, "value", ColumnType::Double),
        ],
        &["series"],
        &["t"],
    )?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        println!("{}", toml::to_string_pretty(&CoordConfig::default())?);
        return Ok(());
    }

    init_tracing();
    tracing::info!("Starting TempoDB query coordinator...");

    let config = load_config(&cli.config);
    let num_shards = cli.shards.unwrap_or(config.cluster.num_shards);

    if cli.wait_for_seeds {
        let seeds = SeedsClient::new(config.cluster.seeds_url.clone());
        let members = seeds
            .await_members(config.cluster.cluster_membership_timeout_secs)
            .await?;
        tracing::info!(members = members.len(), "cluster membership discovered");
    }

    let dataset = demo_dataset(&cli.dataset)?;
    let cluster =
        InProcessCluster::start(dataset, cli.nodes.max(1), num_shards, config.query.clone())
            .await?;
    tracing::info!(
        dataset = cli.dataset,
        nodes = cli.nodes.max(1),
        shards = num_shards,
        "coordinator ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down, draining in-flight queries");
    cluster.shutdown().await;
    Ok(())
}
