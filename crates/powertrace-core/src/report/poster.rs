//! Turns aggregated metrics into posted results.

use std::collections::BTreeMap;

use super::{
    DouCalculator, ResultSink, SENTINEL, Verdict, battery_life_hours, post_result, round_half_up,
    slug, with_suffix,
};
use crate::aggregate::Metric;
use crate::config::{Limits, ReportConfig};
use crate::error::Result;
use crate::history::HistoryStore;

/// Statistics in milliamps are eligible for power conversion and battery life.
const CURRENT_UNIT_SUFFIX: &str = " mA";

/// Converts, rounds, judges and emits final values.
#[derive(Debug, Clone)]
pub struct ResultPoster {
    config: ReportConfig,
    schemas: BTreeMap<String, String>,
    history: Option<HistoryStore>,
}

impl ResultPoster {
    /// `schemas` maps schema names to reporting units.
    pub fn new(config: ReportConfig, schemas: BTreeMap<String, String>) -> Self {
        Self {
            config,
            schemas,
            history: None,
        }
    }

    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    fn reporting_unit<'a>(&'a self, schema: &'a str) -> &'a str {
        self.schemas.get(schema).map_or(schema, String::as_str)
    }

    /// Post every metric, then the DoU score if configured.
    ///
    /// Returns the DoU composite (mA) when one could be computed.
    pub fn post_metrics(
        &self,
        metrics: &[Metric],
        sink: &mut dyn ResultSink,
    ) -> Result<Option<f64>> {
        let mut dou = self.config.dou.clone().map(DouCalculator::new);

        for metric in metrics {
            let ru = with_suffix(
                self.reporting_unit(&metric.tag),
                self.config.ru_suffix.as_deref(),
            );

            if metric.is_empty() {
                log::warn!("{}: no accepted measurements, posting sentinel", metric.tag);
                let schema = with_suffix(&metric.tag, self.config.schema_suffix.as_deref());
                post_result(sink, &ru, &schema, SENTINEL, &self.config.limits_for(&metric.tag));
                if self.config.report_battery_life {
                    self.post_battery_life(sink, &ru, &schema, None);
                }
                continue;
            }

            for (statistic, &average) in &metric.averages {
                let is_primary = *statistic == self.config.primary_statistic;
                let base = if is_primary {
                    metric.tag.clone()
                } else {
                    format!("{}_{}", metric.tag, slug(statistic))
                };
                let schema = with_suffix(&base, self.config.schema_suffix.as_deref());
                let is_current = statistic.ends_with(CURRENT_UNIT_SUFFIX);

                let to_power = match self.config.voltage {
                    Some(v) if self.config.convert_to_power && is_current => v,
                    _ => 1.0,
                };
                let value = self.historical_value(&ru, &schema, average * to_power)?;
                let posted = round_half_up(value, self.config.decimal_places);
                post_result(sink, &ru, &schema, posted, &self.config.limits_for(&base));

                // Battery life and DoU follow the posted value, history included.
                if is_primary && is_current {
                    let current_ma = value / to_power;
                    if self.config.report_battery_life {
                        self.post_battery_life(sink, &ru, &schema, Some(current_ma));
                    }
                    if let Some(dou) = dou.as_mut() {
                        dou.record(&metric.tag, current_ma);
                    }
                }
            }
        }

        let Some(dou) = dou else {
            return Ok(None);
        };
        let composite = dou.composite();
        let hours = match (self.config.battery_capacity_mwh, self.config.voltage) {
            (Some(capacity), Some(voltage)) => dou.hours(capacity, voltage),
            _ => None,
        };
        let ru = with_suffix(&dou.config().reporting_unit, self.config.ru_suffix.as_deref());
        let schema = with_suffix(&dou.config().schema, self.config.schema_suffix.as_deref());
        let value = hours.map_or(SENTINEL, |h| round_half_up(h, self.config.decimal_places));
        let limits = self.config.limits_for(&dou.config().schema);
        let verdict = post_result(sink, &ru, &schema, value, &limits);
        log::info!("DoU composite {composite:?} mA -> {value}h ({verdict:?})");
        Ok(composite)
    }

    fn post_battery_life(
        &self,
        sink: &mut dyn ResultSink,
        ru: &str,
        schema: &str,
        current_ma: Option<f64>,
    ) -> Verdict {
        let hours = match (current_ma, self.config.battery_capacity_mwh, self.config.voltage) {
            (Some(c), Some(capacity), Some(voltage)) => battery_life_hours(capacity, c, voltage),
            _ => None,
        };
        let value = hours.map_or(SENTINEL, |h| round_half_up(h, self.config.decimal_places));
        post_result(
            sink,
            &format!("{ru}-{}", self.config.battery_life_ru_suffix),
            &format!("{schema}-{}", self.config.battery_life_schema_suffix),
            value,
            &Limits::default(),
        )
    }

    /// Store this run's value; with averaging on, return the stored average.
    fn historical_value(&self, ru: &str, schema: &str, value: f64) -> Result<f64> {
        let Some(history) = &self.history else {
            return Ok(value);
        };
        let path = history.record(ru, schema, value)?;
        log::debug!("stored {ru}/{schema} = {value} in {}", path.display());
        if !history.config().average {
            return Ok(value);
        }
        Ok(history.average(ru, schema)?.unwrap_or(value))
    }
}
