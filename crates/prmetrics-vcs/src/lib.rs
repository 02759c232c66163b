use async_trait::async_trait;
use thiserror::Error;

mod auth;
mod github;
mod memory;

pub use auth::{AppTokenSource, GitHubAuth};
pub use github::{BaseRef, GITHUB_PROVIDER_NAME, GitHubProvider, PullRequest};
pub use memory::{InMemoryPullRequest, InMemoryVcsProvider, MEMORY_PROVIDER_NAME, RecordedPublish};

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{url} returned {status}: {message}")]
    Status {
        status: u16,
        url: String,
        message: String,
    },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("invalid GitHub App private key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),
}

/// Per-commit outcome of a publish call. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PublishSummary {
    pub fn total(&self) -> usize {
        self.updated + self.skipped + self.failed
    }
}

/// Source-control platform seen by the pipeline.
///
/// Both operations are fail-safe: implementations log their own errors and
/// fall back to "not a reference" or "nothing published".
#[async_trait]
pub trait VcsProvider: Send + Sync {
    /// True when `commit_sha` belongs to a merged pull request whose base is
    /// the default branch.
    async fn is_reference_commit(&self, commit_sha: &str) -> bool;

    /// Writes `report` below the placeholder of every pull request associated
    /// with `commit_sha`. One failing pull request never stops the others.
    async fn publish_metrics(&self, commit_sha: &str, report: &str) -> PublishSummary;

    fn provider_name(&self) -> &str;
}
