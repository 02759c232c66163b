pub mod diff;
pub mod placeholder;
pub mod report;

pub use diff::{MetricDiff, calculate_diffs, round2};
pub use placeholder::{BodyUpdate, PLACEHOLDER_MARKER, plan_body_update, replace_placeholder};
pub use report::{OutputRow, format_number, humanize_name, render_metrics_table};

/// One metric sample for one commit.
///
/// `is_reference` is decided once at ingestion and never rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub commit_sha: String,
    pub name: String,
    pub value: f64,
    pub units: String,
    pub threshold: f64,
    pub is_reference: bool,
    pub is_increase_bad: bool,
}

/// First seven characters of a commit SHA, for log lines.
pub fn short_sha(commit_sha: &str) -> &str {
    match commit_sha.char_indices().nth(7) {
        Some((index, _)) => &commit_sha[..index],
        None => commit_sha,
    }
}
