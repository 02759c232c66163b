use std::time::Duration;

use async_trait::async_trait;
use prmetrics_config::GitHubSettings;
use prmetrics_core::{BodyUpdate, plan_body_update, short_sha};
use serde::{Deserialize, Serialize};

use crate::auth::GitHubAuth;
use crate::{PublishSummary, VcsError, VcsProvider};

pub const GITHUB_PROVIDER_NAME: &str = "github";
pub(crate) const GITHUB_ACCEPT: &str = "application/vnd.github+json";
pub(crate) const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
pub(crate) const API_VERSION: &str = "2022-11-28";

const USER_AGENT: &str = concat!("prmetrics/", env!("CARGO_PKG_VERSION"));
const PAGE_SIZE: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The subset of the GitHub pull request payload this service reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub merged_at: Option<String>,
    pub base: BaseRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BaseRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
}

impl PullRequest {
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }
}

#[derive(Debug, Serialize)]
struct UpdateBodyRequest<'a> {
    body: &'a str,
}

/// GitHub REST API provider.
#[derive(Debug)]
pub struct GitHubProvider {
    client: reqwest::Client,
    api_base: String,
    repo: String,
    default_branch: String,
    auth: GitHubAuth,
}

impl GitHubProvider {
    pub fn new(settings: &GitHubSettings) -> Result<Self, VcsError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        let api_base = settings.api_base.trim_end_matches('/').to_owned();
        let auth = GitHubAuth::from_credentials(client.clone(), &api_base, &settings.credentials)?;

        Ok(Self {
            client,
            api_base,
            repo: settings.repo.clone(),
            default_branch: settings.default_branch.clone(),
            auth,
        })
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// Every pull request GitHub associates with the commit, across all pages.
    pub async fn pulls_for_commit(&self, commit_sha: &str) -> Result<Vec<PullRequest>, VcsError> {
        let url = format!(
            "{}/repos/{}/commits/{}/pulls",
            self.api_base, self.repo, commit_sha
        );
        let token = self.auth.bearer_token().await?;
        let mut pulls = Vec::new();
        let mut page = 1usize;

        loop {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
                .header(API_VERSION_HEADER, API_VERSION)
                .query(&[("per_page", PAGE_SIZE), ("page", page)])
                .send()
                .await?;
            let batch = ensure_success(response)
                .await?
                .json::<Vec<PullRequest>>()
                .await?;

            let last_page = batch.len() < PAGE_SIZE;
            pulls.extend(batch);
            if last_page {
                break;
            }
            page += 1;
        }

        Ok(pulls)
    }

    pub async fn update_pull_body(&self, number: u64, body: &str) -> Result<(), VcsError> {
        let url = format!("{}/repos/{}/pulls/{}", self.api_base, self.repo, number);
        let token = self.auth.bearer_token().await?;

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&token)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
            .header(API_VERSION_HEADER, API_VERSION)
            .json(&UpdateBodyRequest { body })
            .send()
            .await?;
        ensure_success(response).await?;

        Ok(())
    }

    async fn merged_into_default_branch(&self, commit_sha: &str) -> Result<bool, VcsError> {
        let pulls = self.pulls_for_commit(commit_sha).await?;
        Ok(pulls
            .iter()
            .any(|pull| pull.is_merged() && pull.base.ref_name == self.default_branch))
    }

    async fn publish_to_pull(&self, commit: &str, pull: &PullRequest, report: &str) -> Outcome {
        tracing::debug!(commit, pr = pull.number, "updating pull request body");

        match plan_body_update(pull.body.as_deref(), report) {
            BodyUpdate::Blank => {
                tracing::info!(commit, pr = pull.number, "pull request has no body, skipping");
                Outcome::Skipped
            }
            BodyUpdate::MissingPlaceholder => {
                tracing::info!(
                    commit,
                    pr = pull.number,
                    "pull request has no metrics placeholder, skipping"
                );
                Outcome::Skipped
            }
            BodyUpdate::Replaced(body) => match self.update_pull_body(pull.number, &body).await {
                Ok(()) => Outcome::Updated,
                Err(err) => {
                    tracing::warn!(
                        commit,
                        pr = pull.number,
                        error = %err,
                        "failed to update pull request body"
                    );
                    Outcome::Failed
                }
            },
        }
    }
}

enum Outcome {
    Updated,
    Skipped,
    Failed,
}

#[async_trait]
impl VcsProvider for GitHubProvider {
    async fn is_reference_commit(&self, commit_sha: &str) -> bool {
        let commit = short_sha(commit_sha);
        tracing::debug!(commit, "classifying commit");

        match self.merged_into_default_branch(commit_sha).await {
            Ok(true) => {
                tracing::debug!(
                    commit,
                    branch = %self.default_branch,
                    "commit is merged into the default branch"
                );
                true
            }
            Ok(false) => false,
            Err(err) => {
                tracing::error!(commit, error = %err, "failed to classify commit, treating as non-reference");
                false
            }
        }
    }

    async fn publish_metrics(&self, commit_sha: &str, report: &str) -> PublishSummary {
        let commit = short_sha(commit_sha);
        let mut summary = PublishSummary::default();

        let pulls = match self.pulls_for_commit(commit_sha).await {
            Ok(pulls) => pulls,
            Err(err) => {
                tracing::error!(commit, error = %err, "failed to list pull requests for commit");
                return summary;
            }
        };
        if pulls.is_empty() {
            tracing::debug!(commit, "no pull requests for commit");
            return summary;
        }
        tracing::debug!(commit, count = pulls.len(), "pull requests found for commit");

        for pull in &pulls {
            match self.publish_to_pull(commit, pull, report).await {
                Outcome::Updated => summary.updated += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }

        summary
    }

    fn provider_name(&self) -> &str {
        GITHUB_PROVIDER_NAME
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, VcsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let message = response.text().await.unwrap_or_default();
    Err(VcsError::Status {
        status: status.as_u16(),
        url,
        message,
    })
}
