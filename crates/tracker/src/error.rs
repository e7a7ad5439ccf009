use thiserror::Error;

/// Failures inside a provider adapter. These never cross the `PriceProvider` boundary.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

pub type FetchResult<T> = Result<T, FetchError>;

/// Failures of the persistence gateway
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection string is not configured")]
    MissingConnectionString,

    #[error("failed to connect to store: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("failed to ensure store schema: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("failed to write observation at {timestamp}: {source}")]
    Write {
        timestamp: i64,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to close store connection: {0}")]
    Close(#[source] sqlx::Error),
}

impl StoreError {
    /// True when persistence is unavailable for the whole run
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::MissingConnectionString | StoreError::Connect(_)
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
