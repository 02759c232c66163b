use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use prmetrics_core::{BodyUpdate, plan_body_update};

use crate::{PublishSummary, VcsProvider};

pub const MEMORY_PROVIDER_NAME: &str = "memory";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryPullRequest {
    pub number: u64,
    pub body: Option<String>,
    pub base_ref: String,
    pub merged: bool,
}

impl InMemoryPullRequest {
    pub fn open(number: u64, body: impl Into<String>) -> Self {
        Self {
            number,
            body: Some(body.into()),
            base_ref: "main".to_owned(),
            merged: false,
        }
    }

    pub fn merged_into(number: u64, base_ref: impl Into<String>) -> Self {
        Self {
            number,
            body: None,
            base_ref: base_ref.into(),
            merged: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPublish {
    pub commit_sha: String,
    pub report: String,
}

#[derive(Debug, Default)]
struct State {
    pulls_by_commit: HashMap<String, Vec<InMemoryPullRequest>>,
    failing_pulls: HashSet<u64>,
    classifications: Vec<String>,
    publishes: Vec<RecordedPublish>,
}

/// Scriptable provider for tests and local runs without GitHub.
#[derive(Debug)]
pub struct InMemoryVcsProvider {
    default_branch: String,
    reference_commits: HashSet<String>,
    classification_unavailable: bool,
    state: Mutex<State>,
}

impl Default for InMemoryVcsProvider {
    fn default() -> Self {
        Self::new("main")
    }
}

impl InMemoryVcsProvider {
    pub fn new(default_branch: impl Into<String>) -> Self {
        Self {
            default_branch: default_branch.into(),
            reference_commits: HashSet::new(),
            classification_unavailable: false,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_reference_commit(mut self, commit_sha: impl Into<String>) -> Self {
        self.reference_commits.insert(commit_sha.into());
        self
    }

    pub fn with_pull_request(self, commit_sha: impl Into<String>, pull: InMemoryPullRequest) -> Self {
        self.lock()
            .pulls_by_commit
            .entry(commit_sha.into())
            .or_default()
            .push(pull);
        self
    }

    /// Updates to this pull request fail as if the platform rejected them.
    pub fn with_failing_pull(self, number: u64) -> Self {
        self.lock().failing_pulls.insert(number);
        self
    }

    /// Classification behaves as if the platform were unreachable.
    pub fn with_classification_unavailable(mut self) -> Self {
        self.classification_unavailable = true;
        self
    }

    pub fn classification_calls(&self) -> Vec<String> {
        self.lock().classifications.clone()
    }

    pub fn publish_calls(&self) -> Vec<RecordedPublish> {
        self.lock().publishes.clone()
    }

    pub fn pull_body(&self, number: u64) -> Option<String> {
        self.lock()
            .pulls_by_commit
            .values()
            .flatten()
            .find(|pull| pull.number == number)
            .and_then(|pull| pull.body.clone())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl VcsProvider for InMemoryVcsProvider {
    async fn is_reference_commit(&self, commit_sha: &str) -> bool {
        let mut state = self.lock();
        state.classifications.push(commit_sha.to_owned());

        if self.classification_unavailable {
            tracing::error!(commit = commit_sha, "classification unavailable, treating as non-reference");
            return false;
        }

        self.reference_commits.contains(commit_sha)
            || state
                .pulls_by_commit
                .get(commit_sha)
                .is_some_and(|pulls| {
                    pulls
                        .iter()
                        .any(|pull| pull.merged && pull.base_ref == self.default_branch)
                })
    }

    async fn publish_metrics(&self, commit_sha: &str, report: &str) -> PublishSummary {
        let mut state = self.lock();
        state.publishes.push(RecordedPublish {
            commit_sha: commit_sha.to_owned(),
            report: report.to_owned(),
        });

        let failing = state.failing_pulls.clone();
        let mut summary = PublishSummary::default();
        let Some(pulls) = state.pulls_by_commit.get_mut(commit_sha) else {
            return summary;
        };

        for pull in pulls.iter_mut() {
            match plan_body_update(pull.body.as_deref(), report) {
                BodyUpdate::Blank | BodyUpdate::MissingPlaceholder => summary.skipped += 1,
                BodyUpdate::Replaced(_) if failing.contains(&pull.number) => {
                    tracing::warn!(pr = pull.number, "injected pull request update failure");
                    summary.failed += 1;
                }
                BodyUpdate::Replaced(body) => {
                    pull.body = Some(body);
                    summary.updated += 1;
                }
            }
        }

        summary
    }

    fn provider_name(&self) -> &str {
        MEMORY_PROVIDER_NAME
    }
}
