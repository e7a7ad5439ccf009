//! Persistence gateway.
//!
//! A store holds one record per timestamp. `upsert` inserts a missing
//! timestamp or overwrites the price of an existing one, so replaying the same
//! batch is harmless and the last write for a timestamp wins.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use price_tracker_common::{PriceObservation, StoreSettings};
use sqlx::sqlite::SqliteConnection;
use sqlx::{Connection, FromRow};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Result of a single keyed write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
}

/// An open store connection. Single owner; closed exactly once.
#[async_trait]
pub trait PriceStore: Send {
    async fn upsert(&mut self, observation: &PriceObservation) -> StoreResult<WriteOutcome>;

    async fn close(self: Box<Self>) -> StoreResult<()>;
}

/// Opens a [`PriceStore`] for one run
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> StoreResult<Box<dyn PriceStore>>;
}

/// Upsert every record, returning how many were newly inserted.
///
/// A failed write is logged and skipped; the rest of the batch still runs.
/// No store or no records means no I/O and 0.
pub async fn upsert_many<S>(store: Option<&mut S>, records: &[PriceObservation]) -> usize
where
    S: PriceStore + ?Sized,
{
    let Some(store) = store else {
        error!("Store connection is unavailable, cannot insert data");
        return 0;
    };
    if records.is_empty() {
        info!("No price data provided to insert");
        return 0;
    }

    info!("Upserting {} price observations", records.len());

    let mut inserted = 0;
    let mut updated = 0;
    let mut failed = 0;
    for record in records {
        match store.upsert(record).await {
            Ok(WriteOutcome::Inserted) => inserted += 1,
            Ok(WriteOutcome::Updated) => updated += 1,
            Err(e) => {
                failed += 1;
                error!("❌ {}", e);
            }
        }
    }

    if failed > 0 {
        warn!(
            "Upsert finished with {} failed writes: {} inserted, {} updated",
            failed, inserted, updated
        );
    } else {
        info!(
            "✅ Upsert complete: {} inserted, {} updated",
            inserted, updated
        );
    }

    inserted
}

#[derive(Debug, FromRow)]
struct PriceRow {
    timestamp: i64,
    price: f64,
}

impl From<PriceRow> for PriceObservation {
    fn from(row: PriceRow) -> Self {
        PriceObservation::new(row.timestamp, row.price)
    }
}

/// SQLite-backed store over a single sqlx connection
pub struct SqliteStore {
    conn: SqliteConnection,
    table: String,
    schema_ready: bool,
    update_sql: String,
    insert_sql: String,
}

impl SqliteStore {
    /// Wrap an open connection and ensure the schema.
    ///
    /// Schema failures are logged; the store is still returned and usable.
    /// `table` must be a plain identifier (see `TrackerConfig::validate`).
    pub async fn attach(conn: SqliteConnection, table: &str) -> Self {
        let mut store = Self {
            conn,
            table: table.to_string(),
            schema_ready: false,
            update_sql: format!("UPDATE {table} SET price = ? WHERE timestamp = ?"),
            insert_sql: format!("INSERT INTO {table} (timestamp, price) VALUES (?, ?)"),
        };

        match store.ensure_schema().await {
            Ok(()) => {
                store.schema_ready = true;
                info!("Unique timestamp index ensured on {}", store.table);
            }
            Err(e) => warn!("⚠️  {} (continuing without the index)", e),
        }

        store
    }

    /// Whether the unique timestamp index is in place
    pub fn schema_ready(&self) -> bool {
        self.schema_ready
    }

    async fn ensure_schema(&mut self) -> StoreResult<()> {
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (timestamp INTEGER NOT NULL, price REAL NOT NULL)",
            self.table
        );
        let create_index = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {table}_timestamp_asc ON {table} (timestamp ASC)",
            table = self.table
        );

        sqlx::query(&create_table)
            .execute(&mut self.conn)
            .await
            .map_err(StoreError::Schema)?;
        sqlx::query(&create_index)
            .execute(&mut self.conn)
            .await
            .map_err(StoreError::Schema)?;

        Ok(())
    }

    pub async fn count(&mut self) -> StoreResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&mut self.conn)
            .await
            .map_err(StoreError::Schema)
    }

    pub async fn price_at(&mut self, timestamp: i64) -> StoreResult<Option<f64>> {
        let sql = format!(
            "SELECT timestamp, price FROM {} WHERE timestamp = ?",
            self.table
        );
        let row = sqlx::query_as::<_, PriceRow>(&sql)
            .bind(timestamp)
            .fetch_optional(&mut self.conn)
            .await
            .map_err(StoreError::Schema)?;
        Ok(row.map(|row| row.price))
    }

    /// All stored observations, ascending by timestamp
    pub async fn observations(&mut self) -> StoreResult<Vec<PriceObservation>> {
        let sql = format!(
            "SELECT timestamp, price FROM {} ORDER BY timestamp ASC",
            self.table
        );
        let rows = sqlx::query_as::<_, PriceRow>(&sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(StoreError::Schema)?;
        Ok(rows.into_iter().map(PriceObservation::from).collect())
    }
}

#[async_trait]
impl PriceStore for SqliteStore {
    async fn upsert(&mut self, observation: &PriceObservation) -> StoreResult<WriteOutcome> {
        let write_err = |source| StoreError::Write {
            timestamp: observation.timestamp,
            source,
        };

        let updated = sqlx::query(&self.update_sql)
            .bind(observation.price)
            .bind(observation.timestamp)
            .execute(&mut self.conn)
            .await
            .map_err(write_err)?;
        if updated.rows_affected() > 0 {
            return Ok(WriteOutcome::Updated);
        }

        sqlx::query(&self.insert_sql)
            .bind(observation.timestamp)
            .bind(observation.price)
            .execute(&mut self.conn)
            .await
            .map_err(write_err)?;
        Ok(WriteOutcome::Inserted)
    }

    async fn close(self: Box<Self>) -> StoreResult<()> {
        self.conn.close().await.map_err(StoreError::Close)?;
        info!("Store connection closed");
        Ok(())
    }
}

/// Connects to the SQLite store named by [`StoreSettings::url`]
pub struct SqliteConnector {
    settings: StoreSettings,
}

impl SqliteConnector {
    pub fn new(settings: StoreSettings) -> Self {
        Self { settings }
    }

    /// Connect, check liveness, ensure the schema.
    pub async fn open(&self) -> StoreResult<SqliteStore> {
        let url = self
            .settings
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(StoreError::MissingConnectionString)?;

        let mut conn = SqliteConnection::connect(url)
            .await
            .map_err(StoreError::Connect)?;
        conn.ping().await.map_err(StoreError::Connect)?;
        info!("Store connection successful (ping ok)");

        Ok(SqliteStore::attach(conn, &self.settings.table).await)
    }
}

#[async_trait]
impl StoreConnector for SqliteConnector {
    async fn connect(&self) -> StoreResult<Box<dyn PriceStore>> {
        Ok(Box::new(self.open().await?))
    }
}

/// 인메모리 가격 저장소 구현. Clones share the same records.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<BTreeMap<i64, f64>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn price_at(&self, timestamp: i64) -> Option<f64> {
        self.records.read().await.get(&timestamp).copied()
    }

    /// All stored observations, ascending by timestamp
    pub async fn observations(&self) -> Vec<PriceObservation> {
        self.records
            .read()
            .await
            .iter()
            .map(|(timestamp, price)| PriceObservation::new(*timestamp, *price))
            .collect()
    }
}

#[async_trait]
impl PriceStore for InMemoryStore {
    async fn upsert(&mut self, observation: &PriceObservation) -> StoreResult<WriteOutcome> {
        let mut records = self.records.write().await;
        match records.insert(observation.timestamp, observation.price) {
            Some(_) => Ok(WriteOutcome::Updated),
            None => Ok(WriteOutcome::Inserted),
        }
    }

    async fn close(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

/// Hands out clones of one [`InMemoryStore`] and counts connect attempts
#[derive(Default)]
pub struct InMemoryConnector {
    store: InMemoryStore,
    attempts: AtomicUsize,
}

impl InMemoryConnector {
    pub fn new(store: InMemoryStore) -> Self {
        Self {
            store,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    pub fn connect_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for InMemoryConnector {
    async fn connect(&self) -> StoreResult<Box<dyn PriceStore>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.store.clone()))
    }
}
