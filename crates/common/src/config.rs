//! Tracker configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. Every field has a default so a bare environment is a
//! valid configuration (persistence is skipped without a store URL).

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::warn;

pub const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_COINBASE_URL: &str = "https://api.exchange.coinbase.com";
pub const DEFAULT_PRODUCT_ID: &str = "BTC-USD";
/// 5분 캔들
pub const DEFAULT_GRANULARITY: u32 = 300;
pub const DEFAULT_TABLE: &str = "bitcoin_usd";

pub const ENV_STORE_URL: &str = "PRICE_STORE_URL";
pub const ENV_STORE_TABLE: &str = "PRICE_STORE_TABLE";
pub const ENV_PRODUCT_ID: &str = "COINBASE_PRODUCT_ID";
pub const ENV_GRANULARITY: &str = "COINBASE_GRANULARITY";
pub const ENV_COINBASE_URL: &str = "COINBASE_API_URL";
pub const ENV_COINGECKO_URL: &str = "COINGECKO_API_URL";
pub const ENV_VS_CURRENCY: &str = "COINGECKO_VS_CURRENCY";
pub const ENV_INTERVALS: &str = "COINGECKO_INTERVALS";

/// CoinGecko market-chart adapter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinGeckoSettings {
    pub base_url: String,
    pub coin_id: String,
    pub vs_currency: String,
    /// Look-back window in days
    pub days: u32,
    /// Preferred `interval` values, tried in order. Empty means provider default.
    pub intervals: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for CoinGeckoSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_COINGECKO_URL.to_string(),
            coin_id: "bitcoin".to_string(),
            vs_currency: "usd".to_string(),
            days: 5,
            intervals: Vec::new(),
            timeout_secs: 10,
        }
    }
}

/// Coinbase Exchange candles adapter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinbaseSettings {
    pub base_url: String,
    pub product_id: String,
    /// Candle width in seconds
    #[serde(deserialize_with = "lenient_granularity")]
    pub granularity: u32,
    pub lookback_hours: u32,
    /// Upstream limit on candles returned by one request
    pub max_candles: u32,
    pub timeout_secs: u64,
}

impl Default for CoinbaseSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_COINBASE_URL.to_string(),
            product_id: DEFAULT_PRODUCT_ID.to_string(),
            granularity: DEFAULT_GRANULARITY,
            lookback_hours: 48,
            max_candles: 300,
            timeout_secs: 15,
        }
    }
}

/// Persistence gateway settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// sqlx connection string, e.g. `sqlite://prices.db?mode=rwc`
    pub url: Option<String>,
    pub table: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: None,
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub coingecko: CoinGeckoSettings,
    pub coinbase: CoinbaseSettings,
    pub store: StoreSettings,
}

impl TrackerConfig {
    /// Defaults, overridden by `path` (if given), overridden by the process environment
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply environment overrides through `lookup` so tests need not touch the real environment
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_STORE_URL) {
            let url = url.trim();
            self.store.url = (!url.is_empty()).then(|| url.to_string());
        }
        if let Some(table) = lookup(ENV_STORE_TABLE) {
            self.store.table = table.trim().to_string();
        }
        if let Some(product) = lookup(ENV_PRODUCT_ID) {
            self.coinbase.product_id = product.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_GRANULARITY) {
            self.coinbase.granularity = parse_granularity(&raw);
        }
        if let Some(url) = lookup(ENV_COINBASE_URL) {
            self.coinbase.base_url = url.trim().to_string();
        }
        if let Some(url) = lookup(ENV_COINGECKO_URL) {
            self.coingecko.base_url = url.trim().to_string();
        }
        if let Some(currency) = lookup(ENV_VS_CURRENCY) {
            self.coingecko.vs_currency = currency.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_INTERVALS) {
            self.coingecko.intervals = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    pub fn validate(&mut self) -> ConfigResult<()> {
        if self.coinbase.granularity == 0 {
            warn!(
                "Coinbase granularity must be positive, using default {}s",
                DEFAULT_GRANULARITY
            );
            self.coinbase.granularity = DEFAULT_GRANULARITY;
        }
        if !is_valid_identifier(&self.store.table) {
            return Err(ConfigError::InvalidTable(self.store.table.clone()));
        }
        Ok(())
    }
}

/// Granularity must be a positive integer number of seconds.
/// Anything else falls back to [`DEFAULT_GRANULARITY`] with a warning.
pub fn parse_granularity(raw: &str) -> u32 {
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 && value <= u32::MAX as i64 => value as u32,
        Ok(value) => {
            warn!(
                "Granularity {} is not a positive number of seconds, using default {}s",
                value, DEFAULT_GRANULARITY
            );
            DEFAULT_GRANULARITY
        }
        Err(_) => {
            warn!(
                "Invalid granularity {:?}, using default {}s",
                raw, DEFAULT_GRANULARITY
            );
            DEFAULT_GRANULARITY
        }
    }
}

/// TOML counterpart of [`parse_granularity`].
/// Bad values warn and fall back instead of failing the load.
fn lenient_granularity<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match toml::Value::deserialize(deserializer)? {
        toml::Value::Integer(value) => parse_granularity(&value.to_string()),
        toml::Value::String(raw) => parse_granularity(&raw),
        other => {
            warn!(
                "Invalid granularity {}, using default {}s",
                other, DEFAULT_GRANULARITY
            );
            DEFAULT_GRANULARITY
        }
    })
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
