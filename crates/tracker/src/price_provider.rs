use async_trait::async_trait;
use futures::future::join_all;
use price_tracker_common::PriceObservation;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Price provider trait for different upstream sources.
///
/// Implementations contain their own failures: an error ends the fetch early and
/// whatever was collected so far (possibly nothing) is returned.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Fetch recent observations, ascending by timestamp
    async fn fetch_observations(&self) -> Vec<PriceObservation>;

    /// Get the name of the source
    fn name(&self) -> &str;
}

/// Runs every provider concurrently and merges their results
pub struct FetchCoordinator {
    providers: Vec<Arc<dyn PriceProvider>>,
}

impl FetchCoordinator {
    pub fn new(providers: Vec<Arc<dyn PriceProvider>>) -> Self {
        Self { providers }
    }

    /// One task per provider; every task is awaited even if another fails.
    /// Results keep provider registration order.
    pub async fn fetch_by_source(&self) -> Vec<(String, Vec<PriceObservation>)> {
        let handles: Vec<_> = self
            .providers
            .iter()
            .map(|provider| {
                let provider = Arc::clone(provider);
                tokio::spawn(async move { provider.fetch_observations().await })
            })
            .collect();

        let outcomes = join_all(handles).await;

        self.providers
            .iter()
            .zip(outcomes)
            .map(|(provider, outcome)| {
                let name = provider.name().to_string();
                let observations = match outcome {
                    Ok(observations) => observations,
                    Err(e) => {
                        error!(source = %name, "❌ Provider task failed: {}", e);
                        Vec::new()
                    }
                };

                if observations.is_empty() {
                    warn!(source = %name, "No observations fetched");
                } else {
                    info!(
                        source = %name,
                        count = observations.len(),
                        "Fetched observations"
                    );
                }

                (name, observations)
            })
            .collect()
    }

    /// Concatenation of all sources, first provider first. Not re-sorted.
    pub async fn fetch_all(&self) -> Vec<PriceObservation> {
        self.fetch_by_source()
            .await
            .into_iter()
            .flat_map(|(_, observations)| observations)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use std::time::{Duration, Instant};

    mock! {
        Provider {}

        #[async_trait]
        impl PriceProvider for Provider {
            async fn fetch_observations(&self) -> Vec<PriceObservation>;
            fn name(&self) -> &str;
        }
    }

    fn provider(name: &str, observations: Vec<PriceObservation>) -> MockProvider {
        let mut mock = MockProvider::new();
        mock.expect_name().return_const(name.to_string());
        mock.expect_fetch_observations()
            .times(1)
            .returning(move || observations.clone());
        mock
    }

    struct SlowProvider {
        name: &'static str,
        delay: Duration,
        observation: PriceObservation,
    }

    #[async_trait]
    impl PriceProvider for SlowProvider {
        async fn fetch_observations(&self) -> Vec<PriceObservation> {
            tokio::time::sleep(self.delay).await;
            vec![self.observation]
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    struct PanickingProvider;

    #[async_trait]
    impl PriceProvider for PanickingProvider {
        async fn fetch_observations(&self) -> Vec<PriceObservation> {
            panic!("unexpected upstream shape")
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_concatenates_in_provider_order() {
        // Given
        let first = provider(
            "coingecko",
            vec![PriceObservation::new(1000, 1.0), PriceObservation::new(2000, 2.0)],
        );
        let second = provider("coinbase", vec![PriceObservation::new(1500, 1.5)]);
        let coordinator = FetchCoordinator::new(vec![Arc::new(first), Arc::new(second)]);

        // When
        let combined = coordinator.fetch_all().await;

        // Then - 전역 정렬 없이 순서대로 이어붙임
        assert_eq!(
            combined,
            vec![
                PriceObservation::new(1000, 1.0),
                PriceObservation::new(2000, 2.0),
                PriceObservation::new(1500, 1.5),
            ]
        );
    }

    #[tokio::test]
    async fn test_one_empty_provider_does_not_hide_the_other() {
        let first = provider("coingecko", Vec::new());
        let second = provider("coinbase", vec![PriceObservation::new(1500, 1.5)]);
        let coordinator = FetchCoordinator::new(vec![Arc::new(first), Arc::new(second)]);

        let by_source = coordinator.fetch_by_source().await;

        assert_eq!(by_source.len(), 2);
        assert_eq!(by_source[0].0, "coingecko");
        assert!(by_source[0].1.is_empty());
        assert_eq!(by_source[1].1, vec![PriceObservation::new(1500, 1.5)]);
    }

    #[tokio::test]
    async fn test_panicking_provider_is_contained() {
        // Given - 첫 번째 provider가 panic
        let broken = PanickingProvider;
        let healthy = provider("coinbase", vec![PriceObservation::new(1500, 1.5)]);
        let coordinator = FetchCoordinator::new(vec![Arc::new(broken), Arc::new(healthy)]);

        // When
        let combined = coordinator.fetch_all().await;

        // Then
        assert_eq!(combined, vec![PriceObservation::new(1500, 1.5)]);
    }

    #[tokio::test]
    async fn test_all_empty_yields_empty() {
        let coordinator = FetchCoordinator::new(vec![
            Arc::new(provider("coingecko", Vec::new())),
            Arc::new(provider("coinbase", Vec::new())),
        ]);

        assert!(coordinator.fetch_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_providers_run_concurrently() {
        let delay = Duration::from_millis(300);
        let coordinator = FetchCoordinator::new(vec![
            Arc::new(SlowProvider {
                name: "slow-a",
                delay,
                observation: PriceObservation::new(1, 1.0),
            }),
            Arc::new(SlowProvider {
                name: "slow-b",
                delay,
                observation: PriceObservation::new(2, 2.0),
            }),
        ]);

        let started = Instant::now();
        let combined = coordinator.fetch_all().await;
        let elapsed = started.elapsed();

        assert_eq!(combined.len(), 2);
        assert!(
            elapsed < delay * 2 - Duration::from_millis(50),
            "providers ran sequentially: {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_slower_first_provider_still_comes_first() {
        let coordinator = FetchCoordinator::new(vec![
            Arc::new(SlowProvider {
                name: "slow",
                delay: Duration::from_millis(150),
                observation: PriceObservation::new(1, 1.0),
            }),
            Arc::new(SlowProvider {
                name: "fast",
                delay: Duration::from_millis(1),
                observation: PriceObservation::new(2, 2.0),
            }),
        ]);

        let combined = coordinator.fetch_all().await;

        assert_eq!(combined[0].timestamp, 1);
        assert_eq!(combined[1].timestamp, 2);
    }
}
