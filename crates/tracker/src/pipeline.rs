use crate::price_provider::FetchCoordinator;
use crate::store::{upsert_many, StoreConnector};
use tracing::{error, info};

/// Outcome of one fetch-and-persist cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub fetched: usize,
    pub inserted: usize,
    /// True when a store connection was opened for this cycle
    pub persisted: bool,
}

/// Fetch from every provider, then upsert the combined batch.
///
/// The store is only contacted when there is something to write, and is
/// always closed afterwards. No failure here is fatal; it shows up in the report.
pub async fn run_cycle(
    coordinator: &FetchCoordinator,
    connector: &dyn StoreConnector,
) -> CycleReport {
    let observations = coordinator.fetch_all().await;
    let mut report = CycleReport {
        fetched: observations.len(),
        ..CycleReport::default()
    };

    if observations.is_empty() {
        error!("No price data fetched from any provider, nothing to persist");
        return report;
    }
    info!("Fetched {} price observations in total", observations.len());

    let mut store = match connector.connect().await {
        Ok(store) => store,
        Err(e) => {
            error!("❌ Persistence unavailable, insertion skipped: {}", e);
            return report;
        }
    };
    report.persisted = true;

    report.inserted = upsert_many(Some(&mut *store), &observations).await;
    info!("{} new observations inserted", report.inserted);

    if let Err(e) = store.close().await {
        error!("Error while closing store connection: {}", e);
    }

    report
}
