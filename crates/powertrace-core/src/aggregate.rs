//! Cross-iteration aggregation of per-interval measurements.
//!
//! Each schema gets one [`Metric`]. A measurement joins the metric named by its
//! tag (iteration suffix stripped) when its interval is valid and its duration
//! stays within [`DURATION_TOLERANCE_MS`] of the pivot, the duration of the
//! first measurement the metric accepted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::interval::TimeInterval;

/// Separates a schema from an iteration counter in interval tags (`Foo__3`).
pub const ITERATION_SEPARATOR: &str = "__";
/// Maximum duration deviation from the pivot, exclusive.
pub const DURATION_TOLERANCE_MS: i64 = 10_000;

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// Statistics computed for one interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub interval: TimeInterval,
    pub statistics: BTreeMap<String, f64>,
}

impl Measurement {
    pub fn new(interval: TimeInterval, statistics: BTreeMap<String, f64>) -> Self {
        Self {
            interval,
            statistics,
        }
    }

    /// A placeholder that keeps ordering for an interval that produced no data.
    pub fn without_statistics(interval: TimeInterval) -> Self {
        Self::new(interval, BTreeMap::new())
    }

    pub fn is_valid(&self) -> bool {
        self.interval.is_valid()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.interval.duration_ms()
    }

    /// Schema owning this measurement's tag.
    pub fn schema(&self) -> &str {
        schema_of(&self.interval.tag)
    }
}

/// Strip the iteration suffix from an interval tag.
pub fn schema_of(tag: &str) -> &str {
    tag.split(ITERATION_SEPARATOR).next().unwrap_or(tag)
}

// ---------------------------------------------------------------------------
// Metric
// ---------------------------------------------------------------------------

/// Running aggregate for one schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub tag: String,
    pub totals: BTreeMap<String, f64>,
    pub averages: BTreeMap<String, f64>,
    pub measurements: Vec<Measurement>,
    pub pivot_duration_ms: Option<i64>,
}

impl Metric {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            totals: BTreeMap::new(),
            averages: BTreeMap::new(),
            measurements: Vec::new(),
            pivot_duration_ms: None,
        }
    }

    /// Accept or reject one measurement. Returns whether it was accepted.
    pub fn add_measurement(&mut self, measurement: Measurement) -> bool {
        if !measurement.is_valid() {
            return false;
        }
        let Some(duration) = measurement.duration_ms() else {
            return false;
        };

        match self.pivot_duration_ms {
            None => self.pivot_duration_ms = Some(duration),
            Some(pivot) if (duration - pivot).abs() < DURATION_TOLERANCE_MS => {}
            Some(pivot) => {
                log::warn!(
                    "{}: rejecting '{}' (duration {duration}ms vs pivot {pivot}ms)",
                    self.tag,
                    measurement.interval.tag
                );
                return false;
            }
        }

        for (name, value) in &measurement.statistics {
            *self.totals.entry(name.clone()).or_insert(0.0) += value;
        }
        self.measurements.push(measurement);

        let n = self.measurements.len() as f64;
        self.averages = self
            .totals
            .iter()
            .map(|(name, total)| (name.clone(), total / n))
            .collect();
        true
    }

    /// No accepted measurement yet.
    pub fn is_empty(&self) -> bool {
        self.averages.is_empty()
    }

    pub fn count(&self) -> usize {
        self.measurements.len()
    }

    pub fn average(&self, statistic: &str) -> Option<f64> {
        self.averages.get(statistic).copied()
    }

    fn values(&self, statistic: &str) -> Vec<f64> {
        self.measurements
            .iter()
            .filter_map(|m| m.statistics.get(statistic).copied())
            .collect()
    }

    /// Sample standard deviation across accepted iterations (needs two).
    pub fn stdev(&self, statistic: &str) -> Option<f64> {
        let values = self.values(statistic);
        if values.len() < 2 {
            return None;
        }
        Some(Statistics::std_dev(&values))
    }

    pub fn min(&self, statistic: &str) -> Option<f64> {
        let values = self.values(statistic);
        (!values.is_empty()).then(|| Statistics::min(&values))
    }

    pub fn max(&self, statistic: &str) -> Option<f64> {
        let values = self.values(statistic);
        (!values.is_empty()).then(|| Statistics::max(&values))
    }
}

// ---------------------------------------------------------------------------
// combine
// ---------------------------------------------------------------------------

/// Fold measurements into one metric per known schema, in schema order.
///
/// Invalid measurements are skipped; measurements whose schema is unknown are
/// logged and dropped. Schemas nobody measured stay present and empty.
pub fn combine<'a>(
    schemas: impl IntoIterator<Item = &'a str>,
    measurements: impl IntoIterator<Item = Measurement>,
) -> Vec<Metric> {
    let mut metrics: BTreeMap<String, Metric> = schemas
        .into_iter()
        .map(|s| (s.to_string(), Metric::new(s)))
        .collect();

    for measurement in measurements {
        if !measurement.is_valid() {
            continue;
        }
        let schema = measurement.schema().to_string();
        match metrics.get_mut(&schema) {
            Some(metric) => {
                metric.add_measurement(measurement);
            }
            None => log::warn!(
                "orphan measurement '{}': no schema '{schema}'",
                measurement.interval.tag
            ),
        }
    }

    metrics.into_values().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::IntervalStatus;

    fn measurement(tag: &str, start: i64, duration: i64, value: f64) -> Measurement {
        let mut interval = TimeInterval::with_bounds(tag, start, start + duration);
        interval.mark_valid();
        Measurement::new(interval, BTreeMap::from([("avg".to_string(), value)]))
    }

    #[test]
    fn schema_strips_iteration_suffix() {
        assert_eq!(schema_of("Foo__3"), "Foo");
        assert_eq!(schema_of("Foo"), "Foo");
        assert_eq!(schema_of("Foo_bar__1__2"), "Foo_bar");
    }

    #[test]
    fn pivot_and_tolerance() {
        let mut m = Metric::new("Foo");
        assert!(m.add_measurement(measurement("Foo__1", 0, 100_000, 10.0)));
        assert!(m.add_measurement(measurement("Foo__2", 200_000, 100_500, 20.0)));
        assert!(!m.add_measurement(measurement("Foo__3", 400_000, 200_000, 90.0)));
        assert_eq!(m.count(), 2);
        assert_eq!(m.pivot_duration_ms, Some(100_000));
        assert!((m.average("avg").unwrap() - 15.0).abs() < 1e-12);
        assert!((m.totals["avg"] - 30.0).abs() < 1e-12);
    }

    #[test]
    fn tolerance_is_exclusive() {
        let mut m = Metric::new("Foo");
        m.add_measurement(measurement("Foo", 0, 50_000, 1.0));
        assert!(!m.add_measurement(measurement("Foo", 0, 60_000, 1.0)));
        assert!(m.add_measurement(measurement("Foo", 0, 40_001, 1.0)));
    }

    #[test]
    fn invalid_measurement_never_sets_pivot() {
        let mut m = Metric::new("Foo");
        let mut bad = measurement("Foo", 0, 1_000, 5.0);
        bad.interval.status = IntervalStatus::Invalid;
        assert!(!m.add_measurement(bad));
        assert_eq!(m.pivot_duration_ms, None);
        assert!(m.is_empty());
    }

    #[test]
    fn spread_across_iterations() {
        let mut m = Metric::new("Foo");
        for (i, v) in [10.0, 20.0, 30.0].into_iter().enumerate() {
            m.add_measurement(measurement("Foo", i as i64 * 10, 1_000, v));
        }
        assert!((m.stdev("avg").unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(m.min("avg"), Some(10.0));
        assert_eq!(m.max("avg"), Some(30.0));
        assert_eq!(m.stdev("missing"), None);
        assert_eq!(m.min("missing"), None);
    }

    #[test]
    fn combine_routes_and_keeps_empty_schemas() {
        let mut invalid = measurement("Bar", 0, 1_000, 99.0);
        invalid.interval.status = IntervalStatus::Invalid;
        let metrics = combine(
            ["Foo", "Bar", "Baz"],
            vec![
                measurement("Foo__1", 0, 1_000, 2.0),
                measurement("Foo__2", 0, 1_000, 4.0),
                invalid,
                measurement("Orphan__1", 0, 1_000, 7.0),
            ],
        );
        let tags: Vec<&str> = metrics.iter().map(|m| m.tag.as_str()).collect();
        assert_eq!(tags, vec!["Bar", "Baz", "Foo"]);
        assert!(metrics[0].is_empty());
        assert!(metrics[1].is_empty());
        assert!((metrics[2].average("avg").unwrap() - 3.0).abs() < 1e-12);
    }
}
