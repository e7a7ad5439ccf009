pub mod coinbase;
pub mod coingecko;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod price_provider;
pub mod store;

pub use coinbase::CoinbaseClient;
pub use coingecko::CoinGeckoClient;
pub use error::{FetchError, StoreError};
pub use pipeline::{run_cycle, CycleReport};
pub use price_provider::{FetchCoordinator, PriceProvider};
pub use store::{
    upsert_many, InMemoryConnector, InMemoryStore, PriceStore, SqliteConnector, SqliteStore,
    StoreConnector, WriteOutcome,
};

pub use price_tracker_common::PriceObservation;

/// Sent with every upstream request
pub const USER_AGENT: &str = concat!("btc-price-tracker/", env!("CARGO_PKG_VERSION"));
