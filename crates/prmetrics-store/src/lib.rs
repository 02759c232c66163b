use async_trait::async_trait;
use prmetrics_core::Metric;
use thiserror::Error;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub const MAX_COMMIT_SHA_LEN: usize = 40;
pub const MAX_NAME_LEN: usize = 128;
pub const MAX_UNITS_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Append-only metric history.
///
/// Rows are never updated; "latest" always means the highest row id.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persists one metric and returns its row id.
    async fn submit_metric(&self, metric: &Metric) -> Result<i64, StoreError>;

    /// Latest row per metric name for `commit_sha`, in insertion order.
    async fn metrics_for_commit(&self, commit_sha: &str) -> Result<Vec<Metric>, StoreError>;

    /// Most recent reference row for `name`, if any commit has supplied one.
    async fn reference_for_metric(&self, name: &str) -> Result<Option<Metric>, StoreError>;
}
