//! One measurement run, end to end.
//!
//! Boundary log → intervals (validated) → raw-sample parser → per-schema
//! metrics → posted results. All state for a run lives in a [`PowerRun`]; there
//! is nothing global, so two runs never share intervals, metrics or sinks.

use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Measurement, Metric, combine};
use crate::config::{HarnessConfig, check_decimal_places};
use crate::error::Result;
use crate::history::HistoryStore;
use crate::interval::{TimeInterval, validate};
use crate::report::{PostedResult, ResultPoster, ResultSink};
use crate::samples::RawPowerDataParser;
use crate::timestamps::TimestampExtractor;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Cross-iteration summary of one schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub schema: String,
    pub accepted: usize,
    pub pivot_duration_ms: Option<i64>,
    pub averages: BTreeMap<String, f64>,
    pub stdev: BTreeMap<String, f64>,
    pub min: BTreeMap<String, f64>,
    pub max: BTreeMap<String, f64>,
}

impl From<&Metric> for MetricSummary {
    fn from(metric: &Metric) -> Self {
        Self {
            schema: metric.tag.clone(),
            accepted: metric.count(),
            pivot_duration_ms: metric.pivot_duration_ms,
            averages: metric.averages.clone(),
            stdev: per_statistic(metric, Metric::stdev),
            min: per_statistic(metric, Metric::min),
            max: per_statistic(metric, Metric::max),
        }
    }
}

fn per_statistic(
    metric: &Metric,
    f: impl Fn(&Metric, &str) -> Option<f64>,
) -> BTreeMap<String, f64> {
    metric
        .averages
        .keys()
        .filter_map(|k| f(metric, k).map(|v| (k.clone(), v)))
        .collect()
}

/// Everything one run produced, ready to be written as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub id: String,
    pub started_at_ms: i64,
    pub ended_at_ms: i64,
    pub monitor: String,
    pub intervals: Vec<TimeInterval>,
    pub measurements: Vec<Measurement>,
    pub metrics: Vec<MetricSummary>,
    pub results: Vec<PostedResult>,
    pub dou_composite_ma: Option<f64>,
    /// Set when the raw capture could not be parsed.
    pub parse_error: Option<String>,
    pub powertrace_version: String,
}

impl RunReport {
    /// Posted results that failed.
    pub fn failures(&self) -> impl Iterator<Item = &PostedResult> {
        self.results.iter().filter(|r| !r.verdict.passed())
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Per-run context handed from stage to stage.
pub struct PowerRun<'a> {
    config: &'a HarnessConfig,
    intervals: Vec<TimeInterval>,
    parser: Box<dyn RawPowerDataParser + 'a>,
    started_at_ms: i64,
}

impl<'a> PowerRun<'a> {
    /// Validate the config, then extract and validate intervals from the log.
    pub fn new<R: BufRead>(
        config: &'a HarnessConfig,
        boundary_log: R,
        parser: Box<dyn RawPowerDataParser + 'a>,
    ) -> Result<Self> {
        config.validate()?;
        let intervals = extract_timestamps(config, boundary_log)?;
        Ok(Self {
            config,
            intervals,
            parser,
            started_at_ms: now_ms(),
        })
    }

    pub fn intervals(&self) -> &[TimeInterval] {
        &self.intervals
    }

    /// Parse, aggregate and post, rounding final values to `decimal_places`.
    ///
    /// A fatal capture error keeps the intervals measured before it; the rest
    /// post no data.
    pub fn run(mut self, decimal_places: u32, sink: &mut dyn ResultSink) -> Result<RunReport> {
        check_decimal_places(decimal_places)?;
        let monitor = self.parser.monitor();
        let pass = self.parser.power_measurements(&self.intervals);
        let measurements = pass.measurements;
        let parse_error = pass.error.map(|e| {
            log::error!("{monitor} capture unreadable past this point: {e}");
            e.to_string()
        });

        // Carry parser-side invalidations back onto the run's intervals.
        let by_tag: HashMap<&str, &Measurement> = measurements
            .iter()
            .map(|m| (m.interval.tag.as_str(), m))
            .collect();
        for interval in &mut self.intervals {
            if let Some(m) = by_tag.get(interval.tag.as_str()) {
                interval.status = m.interval.status;
                interval.reason.clone_from(&m.interval.reason);
            }
        }

        let metrics = combine(
            self.config.schemas.keys().map(String::as_str),
            measurements.iter().cloned(),
        );

        let mut report_config = self.config.report.clone();
        report_config.decimal_places = decimal_places;
        let mut poster = ResultPoster::new(report_config, self.config.schemas.clone());
        if let Some(history) = &self.config.history {
            poster = poster.with_history(HistoryStore::new(history.clone()));
        }

        let mut tee = TeeSink {
            inner: sink,
            seen: Vec::new(),
        };
        let dou_composite_ma = poster.post_metrics(&metrics, &mut tee)?;

        let report = RunReport {
            id: Uuid::new_v4().to_string(),
            started_at_ms: self.started_at_ms,
            ended_at_ms: now_ms(),
            monitor: monitor.to_string(),
            intervals: self.intervals,
            measurements,
            metrics: metrics.iter().map(MetricSummary::from).collect(),
            results: tee.seen,
            dou_composite_ma,
            parse_error,
            powertrace_version: crate::VERSION.to_string(),
        };
        log::info!(
            "run {}: {} result(s) posted, {} failing",
            report.id,
            report.results.len(),
            report.failures().count()
        );
        Ok(report)
    }
}

/// Extract intervals from a boundary log and validate them.
pub fn extract_timestamps<R: BufRead>(
    config: &HarnessConfig,
    reader: R,
) -> Result<Vec<TimeInterval>> {
    let extractor = TimestampExtractor::new(&config.markers)?;
    let mut intervals = extractor.extract(reader)?;
    validate(&mut intervals);
    Ok(intervals)
}

/// Forwards to the caller's sink and keeps a copy for the report.
struct TeeSink<'s> {
    inner: &'s mut dyn ResultSink,
    seen: Vec<PostedResult>,
}

impl ResultSink for TeeSink<'_> {
    fn post(&mut self, result: PostedResult) {
        self.seen.push(result.clone());
        self.inner.post(result);
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PowerError;
    use crate::interval::REASON_EOF;
    use crate::report::{MemorySink, SENTINEL};
    use crate::samples::{MonsoonParser, REASON_ABORTED};

    fn config(schemas: &[(&str, &str)]) -> HarnessConfig {
        HarnessConfig {
            schemas: schemas
                .iter()
                .map(|&(s, r)| (s.to_string(), r.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    fn monsoon_run<'a>(cfg: &'a HarnessConfig, log: &str, raw: &'a str) -> PowerRun<'a> {
        PowerRun::new(cfg, log.as_bytes(), Box::new(MonsoonParser::new(raw.as_bytes()))).unwrap()
    }

    #[test]
    fn invalidations_flow_into_report() {
        let cfg = config(&[("A", "ru_a"), ("B", "ru_b")]);
        let log = "\
            1000 AUTOTEST_TEST_BEGIN A\n\
            1010 AUTOTEST_TEST_SUCCESS A\n\
            2000 AUTOTEST_TEST_BEGIN B\n\
            9000 AUTOTEST_TEST_SUCCESS B\n";
        let raw = "1.0 0.1\n1.010 0.1\n2.5 0.2\n";
        let run = monsoon_run(&cfg, log, raw);
        assert!(run.intervals().iter().all(|i| i.is_valid()));

        let mut sink = MemorySink::new();
        let report = run.run(2, &mut sink).unwrap();
        let b = report.intervals.iter().find(|i| i.tag == "B").unwrap();
        assert_eq!(b.reason, REASON_EOF);
        assert_eq!(sink.find("ru_a", "A").unwrap().value, 100.0);
        assert_eq!(sink.find("ru_b", "B").unwrap().value, SENTINEL);
        assert_eq!(report.results.len(), sink.results.len());
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn parse_error_reports_sentinels() {
        let cfg = config(&[("A", "ru_a")]);
        let log = "1000 AUTOTEST_TEST_BEGIN A\n1010 AUTOTEST_TEST_SUCCESS A\n";
        let raw = "1.0 0.1\n1.005 0.1.2\n";
        let run = monsoon_run(&cfg, log, raw);
        let mut sink = MemorySink::new();
        let report = run.run(2, &mut sink).unwrap();
        assert!(report.parse_error.is_some());
        assert!(report.measurements.iter().all(|m| !m.is_valid()));
        assert_eq!(report.intervals[0].reason, REASON_ABORTED);
        assert_eq!(sink.find("ru_a", "A").unwrap().value, SENTINEL);
    }

    #[test]
    fn parse_error_keeps_intervals_closed_before_it() {
        let cfg = config(&[("A", "ru_a"), ("B", "ru_b")]);
        let log = "\
            1000 AUTOTEST_TEST_BEGIN A\n\
            1010 AUTOTEST_TEST_SUCCESS A\n\
            2000 AUTOTEST_TEST_BEGIN B\n\
            2010 AUTOTEST_TEST_SUCCESS B\n";
        let raw = "1.000 0.1\n1.010 0.1\n1.5 0.1\n2.000 1.2.3\n";
        let mut sink = MemorySink::new();
        let report = monsoon_run(&cfg, log, raw).run(2, &mut sink).unwrap();

        assert!(report.parse_error.as_deref().unwrap().contains("line 4"));
        assert_eq!(sink.find("ru_a", "A").unwrap().value, 100.0);
        assert_eq!(sink.find("ru_b", "B").unwrap().value, SENTINEL);
        let b = report.intervals.iter().find(|i| i.tag == "B").unwrap();
        assert_eq!(b.reason, REASON_ABORTED);
    }

    #[test]
    fn rejects_out_of_range_decimal_places() {
        let cfg = config(&[("A", "ru_a")]);
        let log = "1000 AUTOTEST_TEST_BEGIN A\n1010 AUTOTEST_TEST_SUCCESS A\n";
        let mut sink = MemorySink::new();
        let res = monsoon_run(&cfg, log, "1.0 0.1\n1.010 0.1\n").run(400, &mut sink);
        assert!(matches!(res, Err(PowerError::Config { .. })));
        assert!(sink.results.is_empty());
    }

    #[test]
    fn report_serializes() {
        let cfg = config(&[("A", "ru_a")]);
        let run = monsoon_run(&cfg, "", "");
        let report = run.run(1, &mut MemorySink::new()).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, report.id);
        assert_eq!(back.monitor, "monsoon");
        assert_eq!(back.metrics.len(), 1);
        assert_eq!(back.metrics[0].accepted, 0);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut cfg = config(&[]);
        cfg.report.convert_to_power = true;
        let res = PowerRun::new(&cfg, "".as_bytes(), Box::new(MonsoonParser::new("".as_bytes())));
        assert!(res.is_err());
    }
}
