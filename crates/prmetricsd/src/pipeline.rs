use std::sync::Arc;

use prmetrics_core::{Metric, calculate_diffs, render_metrics_table, short_sha};
use prmetrics_store::{MAX_COMMIT_SHA_LEN, MAX_NAME_LEN, MAX_UNITS_LEN, Storage, StoreError};
use prmetrics_vcs::{PublishSummary, VcsProvider};
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Body of `POST /api/v1/metrics`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSubmission {
    pub commit_sha: String,
    pub name: String,
    pub value: f64,
    pub units: String,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default = "default_is_increase_bad")]
    pub is_increase_bad: bool,
}

fn default_is_increase_bad() -> bool {
    true
}

impl MetricSubmission {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.commit_sha.trim().is_empty() {
            return Err(PipelineError::Validation(
                "Commit SHA should not be empty!".to_owned(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(PipelineError::Validation("Name should not be empty!".to_owned()));
        }

        check_len("commitSha", &self.commit_sha, MAX_COMMIT_SHA_LEN)?;
        check_len("name", &self.name, MAX_NAME_LEN)?;
        check_len("units", &self.units, MAX_UNITS_LEN)
    }

    fn into_metric(self, is_reference: bool) -> Metric {
        Metric {
            commit_sha: self.commit_sha,
            name: self.name,
            value: self.value,
            units: self.units,
            threshold: self.threshold,
            is_reference,
            is_increase_bad: self.is_increase_bad,
        }
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), PipelineError> {
    if value.chars().count() > max {
        return Err(PipelineError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Reference samples are stored but never reported on.
    ReferenceStop(Metric),
    Published {
        metric: Metric,
        summary: PublishSummary,
    },
}

/// Ingestion and report publication for submitted metrics.
#[derive(Clone)]
pub struct MetricsPipeline {
    storage: Arc<dyn Storage>,
    vcs: Arc<dyn VcsProvider>,
}

impl MetricsPipeline {
    pub fn new(storage: Arc<dyn Storage>, vcs: Arc<dyn VcsProvider>) -> Self {
        Self { storage, vcs }
    }

    pub fn provider_name(&self) -> &str {
        self.vcs.provider_name()
    }

    /// Validates, classifies and persists one sample.
    ///
    /// Classification happens before the write so `is_reference` is fixed for
    /// the lifetime of the row.
    pub async fn ingest(&self, submission: MetricSubmission) -> Result<Metric, PipelineError> {
        submission.validate()?;

        let is_reference = self.vcs.is_reference_commit(&submission.commit_sha).await;
        let metric = submission.into_metric(is_reference);
        let id = self.storage.submit_metric(&metric).await?;

        tracing::debug!(
            commit = short_sha(&metric.commit_sha),
            metric = %metric.name,
            id,
            is_reference,
            "metric persisted"
        );
        Ok(metric)
    }

    pub async fn build_report(&self, commit_sha: &str) -> Result<String, PipelineError> {
        let commit = short_sha(commit_sha);
        let metrics = self.storage.metrics_for_commit(commit_sha).await?;
        tracing::debug!(commit, count = metrics.len(), "metrics found for commit");

        let mut pairs = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let reference = self.storage.reference_for_metric(&metric.name).await?;
            pairs.push((metric, reference));
        }
        tracing::debug!(
            commit,
            references = pairs.iter().filter(|(_, reference)| reference.is_some()).count(),
            "metric references found for commit"
        );

        Ok(render_metrics_table(&calculate_diffs(pairs)))
    }

    pub async fn publish_report(&self, commit_sha: &str) -> Result<PublishSummary, PipelineError> {
        let report = self.build_report(commit_sha).await?;
        let summary = self.vcs.publish_metrics(commit_sha, &report).await;

        tracing::debug!(
            commit = short_sha(commit_sha),
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            pulls = summary.total(),
            "report published"
        );
        Ok(summary)
    }

    /// Publishes in the background; the caller does not observe the result.
    pub fn dispatch_report(&self, commit_sha: String) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(err) = pipeline.publish_report(&commit_sha).await {
                tracing::error!(
                    commit = short_sha(&commit_sha),
                    error = %err,
                    "failed to publish metrics report"
                );
            }
        })
    }

    /// Runs every step inline, including publication.
    pub async fn process_metric(
        &self,
        submission: MetricSubmission,
    ) -> Result<PipelineOutcome, PipelineError> {
        let metric = self.ingest(submission).await?;
        if metric.is_reference {
            return Ok(PipelineOutcome::ReferenceStop(metric));
        }

        let summary = self.publish_report(&metric.commit_sha).await?;
        Ok(PipelineOutcome::Published { metric, summary })
    }
}

#[cfg(test)]
mod tests {
    use prmetrics_store::MemoryStore;
    use prmetrics_vcs::InMemoryVcsProvider;

    use super::*;

    fn submission(commit_sha: &str, name: &str) -> MetricSubmission {
        MetricSubmission {
            commit_sha: commit_sha.to_owned(),
            name: name.to_owned(),
            value: 1.0,
            units: "ms".to_owned(),
            threshold: 0.0,
            is_increase_bad: true,
        }
    }

    fn pipeline() -> (MetricsPipeline, Arc<MemoryStore>, Arc<InMemoryVcsProvider>) {
        let store = Arc::new(MemoryStore::new());
        let vcs = Arc::new(InMemoryVcsProvider::default());
        (
            MetricsPipeline::new(store.clone(), vcs.clone()),
            store,
            vcs,
        )
    }

    #[test]
    fn submission_defaults_threshold_and_direction() {
        let parsed: MetricSubmission = serde_json::from_str(
            r#"{"commitSha": "abc", "name": "cpu", "value": 2.5, "units": "%"}"#,
        )
        .expect("parse submission");

        assert_eq!(parsed.threshold, 0.0);
        assert!(parsed.is_increase_bad);
        assert_eq!(parsed.commit_sha, "abc");
    }

    #[tokio::test]
    async fn blank_fields_fail_before_any_collaborator_call() {
        let (pipeline, store, vcs) = pipeline();

        for bad in [submission("  ", "cpu"), submission("sha1", "")] {
            let err = pipeline.ingest(bad).await.expect_err("blank field");
            assert!(matches!(err, PipelineError::Validation(_)));
        }

        assert!(store.is_empty());
        assert!(vcs.classification_calls().is_empty());
    }

    #[tokio::test]
    async fn oversized_fields_are_validation_errors() {
        let (pipeline, store, _) = pipeline();
        let mut long_units = submission("sha1", "cpu");
        long_units.units = "u".repeat(17);

        let err = pipeline.ingest(long_units).await.expect_err("units too long");

        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn reference_commits_stop_after_persisting() {
        let store = Arc::new(MemoryStore::new());
        let vcs = Arc::new(InMemoryVcsProvider::default().with_reference_commit("main1"));
        let pipeline = MetricsPipeline::new(store.clone(), vcs.clone());

        let outcome = pipeline
            .process_metric(submission("main1", "cpu"))
            .await
            .expect("process");

        assert!(matches!(outcome, PipelineOutcome::ReferenceStop(ref metric) if metric.is_reference));
        assert_eq!(store.len(), 1);
        assert!(vcs.publish_calls().is_empty());
    }

    #[tokio::test]
    async fn dispatched_report_reaches_provider() {
        let (pipeline, _, vcs) = pipeline();
        pipeline.ingest(submission("sha1", "cpu")).await.expect("ingest");

        pipeline
            .dispatch_report("sha1".to_owned())
            .await
            .expect("task completes");

        let calls = vcs.publish_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].report.contains("| Cpu | 1.0 ms | NEW METRIC |"));
        assert_eq!(pipeline.provider_name(), "memory");
    }
}
