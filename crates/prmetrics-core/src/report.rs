//! Markdown rendering of metric diffs for pull-request descriptions.
//!
//! The output is a wire contract: bots and people diff these tables across
//! pushes, so spacing (including the trailing space left by an empty
//! symbol) is reproduced exactly.

use crate::diff::MetricDiff;

pub const WARNING_GLYPH: &str = "\u{26a0}\u{fe0f}";
pub const CHECK_GLYPH: &str = "\u{2705}";
pub const UP_GLYPH: &str = "\u{1f53a}";
pub const DOWN_GLYPH: &str = "\u{1f53b}";
pub const NEW_METRIC_LABEL: &str = "NEW METRIC";

const TABLE_COLUMNS: &str = "| Metric               | Value   | Diff        |\n\
                             |----------------------|---------|-------------|\n";

/// One rendered table line.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub name: String,
    pub value: f64,
    pub units: String,
    pub sign: &'static str,
    /// Absolute rounded diff; `None` for a metric without reference.
    pub diff: Option<f64>,
    pub symbol: &'static str,
}

impl OutputRow {
    pub fn from_diff(metric_diff: &MetricDiff) -> Self {
        let actual = &metric_diff.actual;
        let diff = metric_diff.diff();

        Self {
            name: humanize_name(&actual.name),
            value: actual.value,
            units: actual.units.clone(),
            sign: sign_for(diff),
            diff: diff.map(f64::abs),
            symbol: symbol_for(diff, actual.threshold, actual.is_increase_bad),
        }
    }

    pub fn diff_cell(&self) -> String {
        match self.diff {
            Some(diff) => format!(
                "{} {} {} {}",
                self.sign,
                format_number(diff),
                self.units,
                self.symbol
            ),
            None => NEW_METRIC_LABEL.to_owned(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "| {} | {} {} | {} |",
            self.name,
            format_number(self.value),
            self.units,
            self.diff_cell()
        )
    }
}

/// `cpu_usage` becomes `Cpu Usage`.
pub fn humanize_name(raw: &str) -> String {
    raw.split('_')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn sign_for(diff: Option<f64>) -> &'static str {
    match diff {
        Some(diff) if diff > 0.0 => "+",
        Some(diff) if diff < 0.0 => "-",
        _ => "",
    }
}

pub fn symbol_for(diff: Option<f64>, threshold: f64, is_increase_bad: bool) -> &'static str {
    let Some(diff) = diff else {
        return "";
    };

    let exceeds = diff.abs() >= threshold;
    if diff > 0.0 && exceeds && is_increase_bad {
        UP_GLYPH
    } else if diff < 0.0 && exceeds && !is_increase_bad {
        DOWN_GLYPH
    } else {
        ""
    }
}

/// Rows are sorted by humanized name; there is no newline after the last row.
pub fn render_metrics_table(diffs: &[MetricDiff]) -> String {
    tracing::debug!(count = diffs.len(), "rendering metrics table");

    let mut rows = diffs.iter().map(OutputRow::from_diff).collect::<Vec<_>>();
    rows.sort_by(|left, right| left.name.cmp(&right.name));

    let header_glyph = if rows.iter().any(|row| !row.symbol.is_empty()) {
        WARNING_GLYPH
    } else {
        CHECK_GLYPH
    };

    let body = rows
        .iter()
        .map(OutputRow::render)
        .collect::<Vec<_>>()
        .join("\n");

    format!("#### {header_glyph} PR Metrics\n{TABLE_COLUMNS}{body}")
}

/// Formats a double the way reports have always shown them: plain decimal
/// with at least one fractional digit between 1e-3 and 1e7, otherwise
/// `<mantissa>E<exponent>`.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }

    let magnitude = value.abs();
    if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        return format!("{value:?}");
    }

    let scientific = format!("{value:e}");
    match scientific.split_once('e') {
        Some((mantissa, exponent)) if mantissa.contains('.') => {
            format!("{mantissa}E{exponent}")
        }
        Some((mantissa, exponent)) => format!("{mantissa}.0E{exponent}"),
        None => scientific,
    }
}
