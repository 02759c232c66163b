//! Placeholder protocol for pull-request descriptions.
//!
//! A body opts in by carrying `<!-- PR-METRICS-PUBLISHER:...-->`. Everything
//! from the marker to the end of its line is kept; everything after that
//! line is replaced by the latest report.

use std::sync::LazyLock;

use regex::Regex;

pub const PLACEHOLDER_MARKER: &str = "<!-- PR-METRICS-PUBLISHER:";

// The marker line ends at any line terminator, not only `\n`.
static PLACEHOLDER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(<!-- PR-METRICS-PUBLISHER:[^\n\r\x{85}\x{2028}\x{2029}]*?-->[^\n\r\x{85}\x{2028}\x{2029}]*)([\s\S]*)",
    )
    .expect("placeholder pattern is valid")
});

/// What to do with one pull-request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyUpdate {
    Blank,
    MissingPlaceholder,
    Replaced(String),
}

/// Returns `None` when the body carries no placeholder.
pub fn replace_placeholder(body: &str, report: &str) -> Option<String> {
    let captures = PLACEHOLDER_PATTERN.captures(body)?;
    let whole = captures.get(0)?;
    let marker_line = captures.get(1)?;

    // Built by hand so `$` in a report is never read as a group reference.
    let mut updated =
        String::with_capacity(whole.start() + marker_line.len() + 1 + report.len());
    updated.push_str(&body[..whole.start()]);
    updated.push_str(marker_line.as_str());
    updated.push('\n');
    updated.push_str(report);
    Some(updated)
}

pub fn plan_body_update(body: Option<&str>, report: &str) -> BodyUpdate {
    let Some(body) = body.filter(|body| !body.trim().is_empty()) else {
        return BodyUpdate::Blank;
    };

    match replace_placeholder(body, report) {
        Some(updated) => BodyUpdate::Replaced(updated),
        None => BodyUpdate::MissingPlaceholder,
    }
}
