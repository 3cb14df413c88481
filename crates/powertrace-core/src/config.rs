//! Explicit per-component configuration.
//!
//! Every struct deserializes from JSON with defaults for omitted fields.
//! [`HarnessConfig::validate`] rejects combinations the pipeline cannot honor,
//! so later stages never have to second-guess their inputs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PowerError, Result};

/// Default start marker written by the on-device instrumentation.
pub const DEFAULT_START_MARKER: &str = "AUTOTEST_TEST_BEGIN";
/// Default end marker written by the on-device instrumentation.
pub const DEFAULT_END_MARKER: &str = "AUTOTEST_TEST_SUCCESS";
/// Statistic posted under the bare schema name.
pub const DEFAULT_PRIMARY_STATISTIC: &str = "average current mA";
/// Sweetberry timestamps are 32-bit microsecond counters.
pub const DEFAULT_WRAP_PERIOD_SECS: f64 = 4_294.967_296;
/// Largest rounding precision accepted for posted values.
pub const MAX_DECIMAL_PLACES: u32 = 15;

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

/// Words that delimit a test case in the device boundary log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub start: String,
    pub end: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_MARKER.to_string(),
            end: DEFAULT_END_MARKER.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Optional pass/fail bounds for one schema. Missing bounds never fail.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Limits {
    pub fn lower_or_min(&self) -> f64 {
        self.lower.unwrap_or(f64::MIN)
    }

    pub fn upper_or_max(&self) -> f64 {
        self.upper.unwrap_or(f64::MAX)
    }
}

/// Contribution of one schema to the DoU composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DouTerm {
    /// `weight * result`.
    Linear { weight: f64 },
    /// Result is the average draw during one pulse window.
    Pulse {
        weight: f64,
        pulses_per_hour: f64,
        pulse_seconds: f64,
    },
    /// Result minus another schema's result, floored at zero.
    Baseline { weight: f64, baseline_schema: String },
}

impl DouTerm {
    pub fn weight(&self) -> f64 {
        match self {
            Self::Linear { weight }
            | Self::Pulse { weight, .. }
            | Self::Baseline { weight, .. } => *weight,
        }
    }
}

/// Day-of-use composite scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DouConfig {
    pub terms: BTreeMap<String, DouTerm>,
    pub reporting_unit: String,
    pub schema: String,
}

impl Default for DouConfig {
    fn default() -> Self {
        Self {
            terms: BTreeMap::new(),
            reporting_unit: "DoU".to_string(),
            schema: "dou_hours".to_string(),
        }
    }
}

/// How final values are derived, named and judged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub decimal_places: u32,
    pub ru_suffix: Option<String>,
    pub schema_suffix: Option<String>,
    /// Statistic posted under the bare schema; others get a slug suffix.
    pub primary_statistic: String,
    /// Battery voltage in volts.
    pub voltage: Option<f64>,
    /// Report current statistics as power (`mA * V = mW`).
    pub convert_to_power: bool,
    pub battery_capacity_mwh: Option<f64>,
    pub report_battery_life: bool,
    pub battery_life_ru_suffix: String,
    pub battery_life_schema_suffix: String,
    pub limits: BTreeMap<String, Limits>,
    pub dou: Option<DouConfig>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            decimal_places: 2,
            ru_suffix: None,
            schema_suffix: None,
            primary_statistic: DEFAULT_PRIMARY_STATISTIC.to_string(),
            voltage: None,
            convert_to_power: false,
            battery_capacity_mwh: None,
            report_battery_life: false,
            battery_life_ru_suffix: "BatteryLife".to_string(),
            battery_life_schema_suffix: "battery_life_hours".to_string(),
            limits: BTreeMap::new(),
            dou: None,
        }
    }
}

impl ReportConfig {
    pub fn limits_for(&self, schema: &str) -> Limits {
        self.limits.get(schema).copied().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// What to do with earlier results in a history file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    #[default]
    Append,
    Overwrite,
}

/// Local per-device result files used for cross-run averaging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub dir: PathBuf,
    pub product: String,
    pub build: String,
    pub mode: HistoryMode,
    /// Post the average over stored results instead of this run's value.
    pub average: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            product: "unknown".to_string(),
            build: "unknown".to_string(),
            mode: HistoryMode::Append,
            average: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Monitors
// ---------------------------------------------------------------------------

/// Multi-rail capture timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweetberryConfig {
    /// Raw timestamps wrap back to zero after this many seconds.
    pub wrap_period_secs: f64,
    /// Host epoch (ms) at which the capture started.
    pub start_epoch_ms: i64,
}

impl Default for SweetberryConfig {
    fn default() -> Self {
        Self {
            wrap_period_secs: DEFAULT_WRAP_PERIOD_SECS,
            start_epoch_ms: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Everything one pipeline run needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub markers: MarkerConfig,
    /// Schema name to reporting-unit name.
    pub schemas: BTreeMap<String, String>,
    pub report: ReportConfig,
    pub history: Option<HistoryConfig>,
    pub sweetberry: SweetberryConfig,
}

impl HarnessConfig {
    /// Load a JSON config and validate it.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.markers.start.trim().is_empty() || self.markers.end.trim().is_empty() {
            return Err(PowerError::config("start and end markers must be non-empty"));
        }
        if self.markers.start == self.markers.end {
            return Err(PowerError::config("start and end markers must differ"));
        }

        let report = &self.report;
        check_decimal_places(report.decimal_places)?;
        if let Some(v) = report.voltage {
            require_positive("voltage", v)?;
        }
        if let Some(c) = report.battery_capacity_mwh {
            require_positive("battery_capacity_mwh", c)?;
        }
        if report.convert_to_power && report.voltage.is_none() {
            return Err(PowerError::config("convert_to_power needs a voltage"));
        }
        let needs_battery = report.report_battery_life || report.dou.is_some();
        if needs_battery && (report.voltage.is_none() || report.battery_capacity_mwh.is_none()) {
            return Err(PowerError::config(
                "battery life and DoU need both voltage and battery_capacity_mwh",
            ));
        }

        for (schema, limits) in &report.limits {
            if let (Some(lo), Some(hi)) = (limits.lower, limits.upper)
                && lo > hi
            {
                return Err(PowerError::config(format!(
                    "limits for '{schema}': lower {lo} above upper {hi}"
                )));
            }
        }

        if let Some(dou) = &report.dou {
            for (schema, term) in &dou.terms {
                let w = term.weight();
                if !w.is_finite() || w < 0.0 {
                    return Err(PowerError::config(format!(
                        "DoU weight for '{schema}' must be a non-negative number"
                    )));
                }
                if let DouTerm::Pulse {
                    pulses_per_hour,
                    pulse_seconds,
                    ..
                } = term
                    && (*pulses_per_hour < 0.0 || *pulse_seconds < 0.0)
                {
                    return Err(PowerError::config(format!(
                        "DoU pulse term for '{schema}' must be non-negative"
                    )));
                }
            }
        }

        require_positive("wrap_period_secs", self.sweetberry.wrap_period_secs)?;
        Ok(())
    }
}

/// Rounding precision beyond what an `f64` carries is rejected.
pub fn check_decimal_places(places: u32) -> Result<()> {
    if places > MAX_DECIMAL_PLACES {
        return Err(PowerError::config(format!(
            "decimal_places {places} exceeds f64 precision (max {MAX_DECIMAL_PLACES})"
        )));
    }
    Ok(())
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PowerError::config(format!("{name} must be a positive number, got {value}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
