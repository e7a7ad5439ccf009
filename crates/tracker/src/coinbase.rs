use crate::error::{FetchError, FetchResult};
use crate::price_provider::PriceProvider;
use crate::USER_AGENT;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, SubsecRound, Utc};
use price_tracker_common::{CoinbaseSettings, PriceObservation};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// [time, low, high, open, close, volume]
const CLOSE_INDEX: usize = 4;
const MIN_CANDLE_LEN: usize = CLOSE_INDEX + 1;
/// 마지막 캔들이 이보다 오래되면 경고 (초)
const STALE_AFTER_SECS: i64 = 600;

/// Coinbase에서 받아오는 캔들스틱 데이터 구조.
/// Rows are kept as `Vec` so a short candle can be skipped instead of failing the page.
type CoinbaseCandleResponse = Vec<Vec<f64>>;

/// One request's `[start, end]` range within the look-back sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Split `[now - lookback, now]` into ranges of at most `max_candles` candles.
///
/// Walks forward from the window start in steps of `max_candles * granularity`
/// seconds; the last range ends exactly at `now`.
pub fn sub_windows(
    now: DateTime<Utc>,
    lookback: ChronoDuration,
    granularity: u32,
    max_candles: u32,
) -> Vec<SubWindow> {
    let step = ChronoDuration::seconds(
        i64::from(granularity.max(1)) * i64::from(max_candles.max(1)),
    );
    let mut windows = Vec::new();
    let mut start = now - lookback;

    while start < now {
        let end = (start + step).min(now);
        windows.push(SubWindow { start, end });
        start = end;
    }

    windows
}

/// ISO-8601 with an explicit UTC offset, e.g. `2021-01-01T00:00:00+00:00`
pub fn format_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Epoch seconds to milliseconds, `None` if not finite or out of `i64` range
fn epoch_millis(secs: f64) -> Option<i64> {
    if !secs.is_finite() {
        return None;
    }
    (secs as i64).checked_mul(1000)
}

/// Candles to observations: seconds → milliseconds, price = close.
/// Candles with fewer than five elements or an unusable time are skipped.
pub fn normalize_candles(candles: &[Vec<f64>]) -> Vec<PriceObservation> {
    candles
        .iter()
        .filter_map(|candle| {
            if candle.len() < MIN_CANDLE_LEN {
                warn!("Skipping malformed candle {:?}", candle);
                return None;
            }
            let Some(timestamp) = epoch_millis(candle[0]) else {
                warn!("Skipping candle with invalid time {:?}", candle);
                return None;
            };
            Some(PriceObservation::new(timestamp, candle[CLOSE_INDEX]))
        })
        .collect()
}

/// Coinbase Exchange와 통신하는 클라이언트
pub struct CoinbaseClient {
    client: Client,
    settings: CoinbaseSettings,
}

impl CoinbaseClient {
    pub fn new(settings: CoinbaseSettings) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &CoinbaseSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/products/{}/candles",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.product_id
        )
    }

    /// Sweep the look-back window ending at `now`, one sub-window at a time.
    ///
    /// The first failing request ends the sweep; candles from earlier
    /// sub-windows are kept. The result is sorted ascending by timestamp.
    pub async fn fetch_window_at(&self, now: DateTime<Utc>) -> Vec<PriceObservation> {
        let now = now.trunc_subsecs(0);
        let windows = sub_windows(
            now,
            ChronoDuration::hours(i64::from(self.settings.lookback_hours)),
            self.settings.granularity,
            self.settings.max_candles,
        );

        info!(
            "Fetching {} candles from Coinbase: {}h at {}s granularity in {} requests",
            self.settings.product_id,
            self.settings.lookback_hours,
            self.settings.granularity,
            windows.len()
        );

        let mut observations = Vec::new();
        for (index, window) in windows.iter().enumerate() {
            match self.fetch_candles(window).await {
                Ok(candles) => {
                    let page = normalize_candles(&candles);
                    debug!(
                        "Sub-window {}/{} ({} → {}): {} candles",
                        index + 1,
                        windows.len(),
                        format_iso(window.start),
                        format_iso(window.end),
                        page.len()
                    );
                    observations.extend(page);
                }
                Err(e) => {
                    match &e {
                        FetchError::UpstreamStatus { status, body } => error!(
                            status,
                            "❌ Coinbase sub-window {}/{} failed, response: {}",
                            index + 1,
                            windows.len(),
                            body
                        ),
                        _ => error!(
                            "❌ Coinbase sub-window {}/{} failed: {}",
                            index + 1,
                            windows.len(),
                            e
                        ),
                    }
                    warn!(
                        "Stopping pagination, keeping {} observations from earlier sub-windows",
                        observations.len()
                    );
                    break;
                }
            }
        }

        observations.sort_by_key(|obs| obs.timestamp);

        if let Some(latest) = observations.last() {
            let age_secs = now.timestamp() - latest.timestamp / 1000;
            let stale_after = STALE_AFTER_SECS.max(2 * i64::from(self.settings.granularity));
            if age_secs > stale_after {
                warn!(
                    "⚠️  Coinbase data is more than {} seconds old: {} seconds ago",
                    stale_after, age_secs
                );
            }
        }

        info!(
            "✅ Fetched {} price points from Coinbase",
            observations.len()
        );
        observations
    }

    async fn fetch_candles(&self, window: &SubWindow) -> FetchResult<CoinbaseCandleResponse> {
        let granularity = self.settings.granularity.to_string();
        let start = format_iso(window.start);
        let end = format_iso(window.end);
        let params = [
            ("granularity", granularity.as_str()),
            ("start", start.as_str()),
            ("end", end.as_str()),
        ];

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
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl PriceProvider for CoinbaseClient {
    async fn fetch_observations(&self) -> Vec<PriceObservation> {
        self.fetch_window_at(Utc::now()).await
    }

    fn name(&self) -> &str {
        "coinbase"
    }
}
