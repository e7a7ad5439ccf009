use crate::error::{FetchError, FetchResult};
use crate::price_provider::PriceProvider;
use crate::USER_AGENT;
use async_trait::async_trait;
use price_tracker_common::{CoinGeckoSettings, PriceObservation};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// market_chart 응답 중 필요한 부분
/// `prices`: [[timestamp_ms, price], ...]
#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    #[serde(default)]
    prices: Option<Vec<[f64; 2]>>,
}

/// CoinGecko market-chart client.
///
/// Issues a single request for the configured look-back window, or one request
/// per preferred interval until one is accepted.
pub struct CoinGeckoClient {
    client: Client,
    settings: CoinGeckoSettings,
}

impl CoinGeckoClient {
    pub fn new(settings: CoinGeckoSettings) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &CoinGeckoSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/coins/{}/market_chart",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.coin_id
        )
    }

    /// Fetch the look-back window. Never fails: errors are logged and yield an empty result.
    pub async fn fetch_prices(&self) -> Vec<PriceObservation> {
        info!(
            "Fetching {} price data for the last {} days from CoinGecko",
            self.settings.coin_id, self.settings.days
        );

        if self.settings.intervals.is_empty() {
            return match self.fetch_once(None).await {
                Ok(observations) => self.finish(observations, None),
                Err(e) => {
                    log_failure(&e, None);
                    Vec::new()
                }
            };
        }

        for interval in self.settings.intervals.iter().map(String::as_str) {
            match self.fetch_once(Some(interval)).await {
                Ok(observations) => return self.finish(observations, Some(interval)),
                Err(e @ FetchError::UpstreamStatus { .. }) => {
                    log_failure(&e, Some(interval));
                    warn!("Interval {:?} rejected, trying next preference", interval);
                }
                Err(e) => {
                    log_failure(&e, Some(interval));
                    return Vec::new();
                }
            }
        }

        error!(
            "❌ CoinGecko rejected every configured interval: {:?}",
            self.settings.intervals
        );
        Vec::new()
    }

    async fn fetch_once(&self, interval: Option<&str>) -> FetchResult<Vec<PriceObservation>> {
        let days = self.settings.days.to_string();
        let mut params = vec![
            ("vs_currency", self.settings.vs_currency.as_str()),
            ("days", days.as_str()),
        ];
        if let Some(interval) = interval {
            params.push(("interval", interval));
        }

        let response = self
            .client
            .get(self.endpoint())
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::UpstreamStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await?;
        parse_market_chart(&body)
    }

    fn finish(
        &self,
        observations: Vec<PriceObservation>,
        interval: Option<&str>,
    ) -> Vec<PriceObservation> {
        info!(
            "✅ Fetched {} price points from CoinGecko (interval: {})",
            observations.len(),
            interval.unwrap_or("default")
        );
        observations
    }
}

fn log_failure(e: &FetchError, interval: Option<&str>) {
    let interval = interval.unwrap_or("default");
    match e {
        FetchError::UpstreamStatus { status, body } => {
            error!(status, interval, "CoinGecko request failed, response: {}", body)
        }
        _ => error!(interval, "CoinGecko request failed: {}", e),
    }
}

/// `prices` absent or null means no data, not an error
pub fn parse_market_chart(body: &str) -> FetchResult<Vec<PriceObservation>> {
    let chart: MarketChartResponse = serde_json::from_str(body)?;
    match chart.prices {
        Some(pairs) => Ok(normalize_pairs(&pairs)),
        None => {
            warn!("CoinGecko response has no 'prices' series");
            Ok(Vec::new())
        }
    }
}

/// Pairs are already `[timestamp_ms, price]`; order is preserved
pub fn normalize_pairs(pairs: &[[f64; 2]]) -> Vec<PriceObservation> {
    pairs
        .iter()
        .map(|[timestamp, price]| PriceObservation::new(*timestamp as i64, *price))
        .collect()
}

#[async_trait]
impl PriceProvider for CoinGeckoClient {
    async fn fetch_observations(&self) -> Vec<PriceObservation> {
        self.fetch_prices().await
    }

    fn name(&self) -> &str {
        "coingecko"
    }
}
