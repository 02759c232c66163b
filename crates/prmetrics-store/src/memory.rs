use std::sync::Mutex;

use async_trait::async_trait;
use prmetrics_core::Metric;

use crate::{Storage, StoreError};

/// In-process store with the same query contract as [`crate::SqliteStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<(i64, Metric)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(i64, Metric)>> {
        // A panic while holding the lock cannot leave rows half-written.
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn submit_metric(&self, metric: &Metric) -> Result<i64, StoreError> {
        let mut rows = self.lock();
        let id = rows.last().map(|(id, _)| id + 1).unwrap_or(1);
        rows.push((id, metric.clone()));
        Ok(id)
    }

    async fn metrics_for_commit(&self, commit_sha: &str) -> Result<Vec<Metric>, StoreError> {
        let rows = self.lock();
        let mut latest: Vec<(i64, Metric)> = Vec::new();
        for (id, metric) in rows.iter().filter(|(_, metric)| metric.commit_sha == commit_sha) {
            latest.retain(|(_, existing)| existing.name != metric.name);
            latest.push((*id, metric.clone()));
        }
        latest.sort_by_key(|(id, _)| *id);
        Ok(latest.into_iter().map(|(_, metric)| metric).collect())
    }

    async fn reference_for_metric(&self, name: &str) -> Result<Option<Metric>, StoreError> {
        let rows = self.lock();
        Ok(rows
            .iter()
            .rev()
            .find(|(_, metric)| metric.name == name && metric.is_reference)
            .map(|(_, metric)| metric.clone()))
    }
}
