//! Final values: naming, rounding, limit classification and sinks.
//!
//! The [`ResultPoster`] turns aggregated metrics into [`PostedResult`]s and
//! hands them to a [`ResultSink`]. Missing data is never omitted: a schema with
//! no accepted measurement is posted as [`SENTINEL`], which always fails.

pub mod dou;
pub mod poster;

use serde::{Deserialize, Serialize};

use crate::config::Limits;

pub use dou::DouCalculator;
pub use poster::ResultPoster;

/// Value posted for schemas without data.
pub const SENTINEL: f64 = -1.0;

// ---------------------------------------------------------------------------
// Posted results and sinks
// ---------------------------------------------------------------------------

/// Pass/fail judgement of one posted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "message", rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail(String),
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// One value as handed to the reporting sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostedResult {
    pub reporting_unit: String,
    pub schema: String,
    pub value: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub verdict: Verdict,
}

/// Destination for final values (dashboard uploader, test listener, file...).
pub trait ResultSink {
    fn post(&mut self, result: PostedResult);
}

/// Keeps everything it is given.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub results: Vec<PostedResult>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// First result posted under `reporting_unit`/`schema`.
    pub fn find(&self, reporting_unit: &str, schema: &str) -> Option<&PostedResult> {
        self.results
            .iter()
            .find(|r| r.reporting_unit == reporting_unit && r.schema == schema)
    }
}

impl ResultSink for MemorySink {
    fn post(&mut self, result: PostedResult) {
        self.results.push(result);
    }
}

/// Writes each result to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn post(&mut self, result: PostedResult) {
        match &result.verdict {
            Verdict::Pass => log::info!(
                "{}/{} = {} (pass)",
                result.reporting_unit,
                result.schema,
                result.value
            ),
            Verdict::Fail(msg) => log::warn!(
                "{}/{} = {} (FAIL: {msg})",
                result.reporting_unit,
                result.schema,
                result.value
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Round half up on `value * 10^places`.
pub fn round_half_up(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor + 0.5).floor() / factor
}

/// Judge a value against optional limits. Negative or non-finite values always fail.
pub fn classify(value: f64, limits: &Limits) -> Verdict {
    let lower = limits.lower_or_min();
    let upper = limits.upper_or_max();
    if !value.is_finite() {
        Verdict::Fail(format!("{value} is not a finite measurement"))
    } else if value < 0.0 {
        Verdict::Fail("Instrumentation test failed".to_string())
    } else if value > upper {
        Verdict::Fail(format!("{value} is greater than allowed limit {upper}"))
    } else if value < lower {
        Verdict::Fail(format!("{value} is less than allowed limit {lower}"))
    } else {
        Verdict::Pass
    }
}

/// Build and emit one result.
pub fn post_result(
    sink: &mut dyn ResultSink,
    reporting_unit: &str,
    schema: &str,
    value: f64,
    limits: &Limits,
) -> Verdict {
    let verdict = classify(value, limits);
    sink.post(PostedResult {
        reporting_unit: reporting_unit.to_string(),
        schema: schema.to_string(),
        value,
        lower_limit: limits.lower_or_min(),
        upper_limit: limits.upper_or_max(),
        verdict: verdict.clone(),
    });
    verdict
}

/// `base` or `base-suffix`.
pub fn with_suffix(base: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(s) if !s.is_empty() => format!("{base}-{s}"),
        _ => base.to_string(),
    }
}

/// Lowercase, with runs of anything non-alphanumeric collapsed to `_`.
pub fn slug(statistic: &str) -> String {
    let mut out = String::with_capacity(statistic.len());
    for c in statistic.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Hours of battery life at a steady current draw.
pub fn battery_life_hours(capacity_mwh: f64, current_ma: f64, voltage: f64) -> Option<f64> {
    let draw_mw = current_ma * voltage;
    (draw_mw > 0.0).then(|| capacity_mwh / draw_mw)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
