use crate::Metric;
use crate::report::humanize_name;

/// A submitted metric paired with the latest reference of the same name.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDiff {
    pub actual: Metric,
    pub reference: Option<Metric>,
}

impl MetricDiff {
    pub fn new(actual: Metric, reference: Option<Metric>) -> Self {
        Self { actual, reference }
    }

    /// `None` means there is nothing to compare against yet, which is not
    /// the same thing as an unchanged value.
    pub fn diff(&self) -> Option<f64> {
        self.reference
            .as_ref()
            .map(|reference| round2(self.actual.value - reference.value))
    }
}

/// Largest magnitude that still carries fractional digits worth rounding.
const ROUNDING_LIMIT: f64 = 1e15;

/// Rounds to two decimals, half away from zero.
pub fn round2(value: f64) -> f64 {
    // Scaling larger values by 100 can overflow to infinity.
    if !value.is_finite() || value.abs() >= ROUNDING_LIMIT {
        return value;
    }

    let rounded = (value.abs() * 100.0).round() / 100.0;
    if rounded == 0.0 {
        return 0.0;
    }

    rounded.copysign(value)
}

/// Pairs are ordered by the name shown in the report, not the raw name.
pub fn calculate_diffs(pairs: Vec<(Metric, Option<Metric>)>) -> Vec<MetricDiff> {
    tracing::debug!(count = pairs.len(), "calculating metric diffs");

    let mut diffs = pairs
        .into_iter()
        .map(|(actual, reference)| MetricDiff::new(actual, reference))
        .collect::<Vec<_>>();
    diffs.sort_by_cached_key(|diff| humanize_name(&diff.actual.name));
    diffs
}
