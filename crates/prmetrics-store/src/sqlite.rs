use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use prmetrics_core::Metric;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{Storage, StoreError};

const METRIC_COLUMNS: &str =
    "commit_sha, name, value, units, threshold, is_reference, is_increase_bad";

/// SQLite-backed metric history.
///
/// Each operation opens its own connection on the blocking pool and drops it
/// before returning, so no connection outlives a single query.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    sqlite_path: PathBuf,
}

impl SqliteStore {
    pub fn open(sqlite_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let sqlite_path = sqlite_path.as_ref().to_path_buf();
        if let Some(parent) = sqlite_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&sqlite_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn)?;
        drop(conn);

        tracing::debug!(path = %sqlite_path.display(), "opened metrics store");
        Ok(Self { sqlite_path })
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    async fn with_connection<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let sqlite_path = self.sqlite_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&sqlite_path)?;
            conn.busy_timeout(Duration::from_secs(5))?;
            operation(&conn)
        })
        .await?
    }
}

#[async_trait]
impl Storage for SqliteStore {
    async fn submit_metric(&self, metric: &Metric) -> Result<i64, StoreError> {
        let metric = metric.clone();
        self.with_connection(move |conn| {
            conn.execute(
                r#"
                INSERT INTO metrics (
                    commit_sha, name, value, units, threshold, is_reference, is_increase_bad
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    metric.commit_sha,
                    metric.name,
                    metric.value,
                    metric.units,
                    metric.threshold,
                    metric.is_reference,
                    metric.is_increase_bad,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn metrics_for_commit(&self, commit_sha: &str) -> Result<Vec<Metric>, StoreError> {
        let commit_sha = commit_sha.to_owned();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&format!(
                r#"
                SELECT {METRIC_COLUMNS}
                FROM metrics
                WHERE id IN (
                    SELECT MAX(id)
                    FROM metrics
                    WHERE commit_sha = ?1
                    GROUP BY name
                )
                ORDER BY id ASC
                "#
            ))?;

            let rows = stmt.query_map(params![commit_sha], metric_from_row)?;
            let metrics = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(metrics)
        })
        .await
    }

    async fn reference_for_metric(&self, name: &str) -> Result<Option<Metric>, StoreError> {
        let name = name.to_owned();
        self.with_connection(move |conn| {
            let metric = conn
                .query_row(
                    &format!(
                        r#"
                        SELECT {METRIC_COLUMNS}
                        FROM metrics
                        WHERE name = ?1 AND is_reference = 1
                        ORDER BY id DESC
                        LIMIT 1
                        "#
                    ),
                    params![name],
                    metric_from_row,
                )
                .optional()?;
            Ok(metric)
        })
        .await
    }
}

fn metric_from_row(row: &Row<'_>) -> rusqlite::Result<Metric> {
    Ok(Metric {
        commit_sha: row.get(0)?,
        name: row.get(1)?,
        value: row.get(2)?,
        units: row.get(3)?,
        threshold: row.get(4)?,
        is_reference: row.get(5)?,
        is_increase_bad: row.get(6)?,
    })
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            commit_sha TEXT NOT NULL CHECK (length(commit_sha) <= 40),
            name TEXT NOT NULL CHECK (length(name) <= 128),
            value REAL NOT NULL,
            units TEXT NOT NULL CHECK (length(units) <= 16),
            threshold REAL NOT NULL,
            is_reference INTEGER NOT NULL,
            is_increase_bad INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_metrics_commit_name
            ON metrics (commit_sha, name);

        CREATE INDEX IF NOT EXISTS idx_metrics_name_reference
            ON metrics (name, is_reference);
        "#,
    )?;

    Ok(())
}
