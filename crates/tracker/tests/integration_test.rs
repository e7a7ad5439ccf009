mod common;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use common::spawn_upstream;
use price_tracker::{
    run_cycle, CoinGeckoClient, CoinbaseClient, CycleReport, FetchCoordinator, InMemoryConnector,
    PriceObservation, SqliteConnector,
};
use price_tracker_common::{
    TrackerConfig, ENV_COINBASE_URL, ENV_COINGECKO_URL, ENV_GRANULARITY, ENV_STORE_URL,
};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

/// CoinGecko과 Coinbase를 한 서버에서 흉내냄
async fn fake_upstreams(healthy: bool) -> String {
    let router = Router::new()
        .route(
            "/coins/:coin_id/market_chart",
            get(move || async move {
                if healthy {
                    (
                        StatusCode::OK,
                        r#"{"prices": [[1609459200000, 30000]]}"#.to_string(),
                    )
                } else {
                    (StatusCode::SERVICE_UNAVAILABLE, "maintenance".to_string())
                }
            }),
        )
        .route(
            "/products/:product/candles",
            get(move || async move {
                if healthy {
                    (
                        StatusCode::OK,
                        "[[1609459200, 29900, 30010, 29980, 29950, 12.5]]".to_string(),
                    )
                } else {
                    (StatusCode::TOO_MANY_REQUESTS, "slow down".to_string())
                }
            }),
        );
    spawn_upstream(router).await
}

fn config_for(base_url: &str, store_url: Option<String>) -> TrackerConfig {
    let mut env = HashMap::new();
    env.insert(ENV_COINGECKO_URL, base_url.to_string());
    env.insert(ENV_COINBASE_URL, base_url.to_string());
    // hourly candles keep the 48h lookback in a single sub-window
    env.insert(ENV_GRANULARITY, "3600".to_string());
    if let Some(url) = store_url {
        env.insert(ENV_STORE_URL, url);
    }

    let mut config = TrackerConfig::default();
    config.apply_env(|key| env.get(key).cloned());
    config.validate().unwrap();
    config
}

fn coordinator_for(config: &TrackerConfig) -> FetchCoordinator {
    FetchCoordinator::new(vec![
        Arc::new(CoinGeckoClient::new(config.coingecko.clone()).unwrap()),
        Arc::new(CoinbaseClient::new(config.coinbase.clone()).unwrap()),
    ])
}

#[tokio::test]
async fn test_end_to_end_colliding_timestamp() {
    // Given
    let base_url = fake_upstreams(true).await;
    let dir = TempDir::new().unwrap();
    let store_url = format!("sqlite://{}?mode=rwc", dir.path().join("prices.db").display());
    let config = config_for(&base_url, Some(store_url));
    let coordinator = coordinator_for(&config);

    // When - combined sequence keeps provider order
    let combined = coordinator.fetch_all().await;
    assert_eq!(
        combined,
        vec![
            PriceObservation::new(1609459200000, 30000.0),
            PriceObservation::new(1609459200000, 29950.0),
        ]
    );

    let connector = SqliteConnector::new(config.store.clone());
    let report = run_cycle(&coordinator, &connector).await;

    // Then - 같은 timestamp는 하나로, 마지막 값 유지
    assert_eq!(
        report,
        CycleReport {
            fetched: 2,
            inserted: 1,
            persisted: true,
        }
    );

    let mut store = connector.open().await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(store.price_at(1609459200000).await.unwrap(), Some(29950.0));
}

#[tokio::test]
async fn test_end_to_end_rerun_is_idempotent() {
    let base_url = fake_upstreams(true).await;
    let dir = TempDir::new().unwrap();
    let store_url = format!("sqlite://{}?mode=rwc", dir.path().join("prices.db").display());
    let config = config_for(&base_url, Some(store_url));
    let connector = SqliteConnector::new(config.store.clone());

    let coordinator = coordinator_for(&config);

    let first = run_cycle(&coordinator, &connector).await;
    let second = run_cycle(&coordinator, &connector).await;

    assert_eq!(first.inserted, 1);
    assert_eq!(second.fetched, 2);
    assert_eq!(second.inserted, 0);
    assert!(second.persisted);

    let mut store = connector.open().await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(store.price_at(1609459200000).await.unwrap(), Some(29950.0));
}

#[tokio::test]
async fn test_end_to_end_both_providers_fail() {
    let base_url = fake_upstreams(false).await;
    let config = config_for(&base_url, None);
    let connector = InMemoryConnector::default();

    let report = run_cycle(&coordinator_for(&config), &connector).await;

    assert_eq!(report, CycleReport::default());
    assert_eq!(connector.connect_attempts(), 0);
}

#[tokio::test]
async fn test_end_to_end_missing_store_url() {
    let base_url = fake_upstreams(true).await;
    let config = config_for(&base_url, None);
    assert_eq!(config.store.url, None);

    let report = run_cycle(
        &coordinator_for(&config),
        &SqliteConnector::new(config.store.clone()),
    )
    .await;

    assert_eq!(report.fetched, 2);
    assert_eq!(report.inserted, 0);
    assert!(!report.persisted);
}
