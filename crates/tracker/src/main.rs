use anyhow::{Context, Result};
use clap::Parser;
use price_tracker::{
    logging, run_cycle, CoinGeckoClient, CoinbaseClient, FetchCoordinator, InMemoryConnector,
    SqliteConnector, StoreConnector,
};
use price_tracker_common::TrackerConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Fetch recent BTC prices from CoinGecko and Coinbase and upsert them into the store
#[derive(Parser, Debug)]
#[command(name = "price-tracker", version, about)]
struct Cli {
    /// TOML config file; environment variables override its values
    #[arg(short, long, env = "PRICE_TRACKER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Fetch only; write into a throwaway in-memory store
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    logging::init(&cli.log_level);
    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    info!("Starting BTC price tracker");

    let config =
        TrackerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let coingecko = CoinGeckoClient::new(config.coingecko.clone())
        .context("Failed to create CoinGecko client")?;
    let coinbase = CoinbaseClient::new(config.coinbase.clone())
        .context("Failed to create Coinbase client")?;
    let coordinator = FetchCoordinator::new(vec![Arc::new(coingecko), Arc::new(coinbase)]);

    let connector: Box<dyn StoreConnector> = if cli.dry_run {
        info!("Dry run: observations go to an in-memory store");
        Box::new(InMemoryConnector::default())
    } else {
        Box::new(SqliteConnector::new(config.store.clone()))
    };

    let report = run_cycle(&coordinator, connector.as_ref()).await;

    info!(
        fetched = report.fetched,
        inserted = report.inserted,
        persisted = report.persisted,
        "BTC price tracker finished"
    );
    Ok(())
}
