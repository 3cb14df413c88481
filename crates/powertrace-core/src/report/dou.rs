//! Day-of-use composite score.
//!
//! Each configured schema contributes to an average daily current draw (mA).
//! Linear terms scale the measured result by their weight. Pulse terms treat
//! the result as the draw during one pulse window and scale it by how much of
//! each hour the pulses occupy. Baseline terms subtract another schema's result
//! first, so a radio-active case only counts its increment over idle.
//!
//! The composite becomes hours as `capacity_mwh / (composite_ma * voltage)`.

use std::collections::BTreeMap;

use crate::config::{DouConfig, DouTerm};

/// Collects per-schema results and combines them.
#[derive(Debug, Clone)]
pub struct DouCalculator {
    config: DouConfig,
    results: BTreeMap<String, f64>,
}

impl DouCalculator {
    pub fn new(config: DouConfig) -> Self {
        Self {
            config,
            results: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &DouConfig {
        &self.config
    }

    /// Record a schema's result. Schemas without a term are ignored.
    pub fn record(&mut self, schema: &str, result_ma: f64) {
        if self.config.terms.contains_key(schema) {
            self.results.insert(schema.to_string(), result_ma);
        }
    }

    /// Weighted contribution of one schema, if it has data.
    pub fn contribution(&self, schema: &str) -> Option<f64> {
        let term = self.config.terms.get(schema)?;
        let result = *self.results.get(schema)?;
        match term {
            DouTerm::Linear { weight } => Some(weight * result),
            DouTerm::Pulse {
                weight,
                pulses_per_hour,
                pulse_seconds,
            } => Some(weight * result * pulses_per_hour * pulse_seconds / 3600.0),
            DouTerm::Baseline {
                weight,
                baseline_schema,
            } => {
                let Some(baseline) = self.results.get(baseline_schema) else {
                    log::warn!(
                        "DoU: '{schema}' needs baseline '{baseline_schema}', which has no data"
                    );
                    return None;
                };
                Some(weight * (result - baseline).max(0.0))
            }
        }
    }

    /// Sum of all available contributions; `None` when nothing contributed.
    pub fn composite(&self) -> Option<f64> {
        let contributions: Vec<f64> = self
            .config
            .terms
            .keys()
            .filter_map(|schema| self.contribution(schema))
            .collect();
        if contributions.is_empty() {
            return None;
        }
        Some(contributions.iter().sum())
    }

    /// Battery life in hours at the composite draw.
    pub fn hours(&self, capacity_mwh: f64, voltage: f64) -> Option<f64> {
        super::battery_life_hours(capacity_mwh, self.composite()?, voltage)
    }
}
