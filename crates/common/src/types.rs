use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single (timestamp, price) sample for the tracked asset.
///
/// `timestamp` is milliseconds since the Unix epoch (UTC) and is the unique key
/// of the store: two observations with the same timestamp are the same sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub timestamp: i64,
    pub price: f64,
}

impl PriceObservation {
    pub fn new(timestamp: i64, price: f64) -> Self {
        Self { timestamp, price }
    }

    /// Timestamp as a UTC datetime, `None` if out of chrono's range
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}
