//! Multi-rail Sweetberry captures.
//!
//! ```text
//! ts:1500us, vbat uW, vdd_cpu uW
//! 0.000100, 812000.0, 120000.5
//! 0.000200, 809500.0, 118250.0
//! ```
//!
//! The first column is seconds since capture start, as a counter that wraps
//! back to zero after a fixed period. Each wrap adds one full period so the
//! corrected timeline stays monotonic; the header offset and the configured
//! start epoch anchor it to host time.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{
    ChannelStats, MeasurementPass, RawPowerDataParser, Sample, SampleCursor, SampleDecoder,
    measure_intervals, snap_ms,
};
use crate::config::SweetberryConfig;
use crate::error::{PowerError, Result};
use crate::interval::TimeInterval;

/// Sum of all rail averages.
pub const TOTAL_POWER: &str = "total power uW";

/// Decodes the header, then comma-separated rail samples.
#[derive(Debug, Clone)]
pub struct SweetberryDecoder {
    config: SweetberryConfig,
    offset_us: Option<f64>,
    rails: Vec<String>,
    last_raw_secs: Option<f64>,
    wraps: u32,
}

impl SweetberryDecoder {
    pub fn new(config: SweetberryConfig) -> Self {
        Self {
            config,
            offset_us: None,
            rails: Vec::new(),
            last_raw_secs: None,
            wraps: 0,
        }
    }

    /// Rail names from the header, in column order.
    pub fn rails(&self) -> &[String] {
        &self.rails
    }

    /// Number of counter wraps seen so far.
    pub fn wraps(&self) -> u32 {
        self.wraps
    }

    fn parse_header(&mut self, line: &str) -> Result<()> {
        let mut columns = line.split(',').map(str::trim);
        let ts = columns.next().unwrap_or_default();
        let offset = ts
            .strip_prefix("ts:")
            .and_then(|s| s.strip_suffix("us"))
            .ok_or_else(|| PowerError::header(format!("expected 'ts:<offset>us', got '{ts}'")))?;
        let offset_us = offset
            .trim()
            .parse::<f64>()
            .map_err(|_| PowerError::header(format!("bad timestamp offset '{offset}'")))?;

        let rails: Vec<String> = columns
            .map(|c| c.strip_suffix("uW").unwrap_or(c).trim().to_string())
            .collect();
        if rails.is_empty() || rails.iter().any(String::is_empty) {
            return Err(PowerError::header(format!("no usable rail names in '{line}'")));
        }

        log::info!("sweetberry capture: offset {offset_us}us, rails {}", rails.join(", "));
        self.offset_us = Some(offset_us);
        self.rails = rails;
        Ok(())
    }

    fn host_time_ms(&mut self, raw_secs: f64) -> f64 {
        if let Some(prev) = self.last_raw_secs
            && raw_secs < prev
        {
            self.wraps += 1;
            log::debug!("sweetberry timestamp wrapped ({prev} -> {raw_secs})");
        }
        self.last_raw_secs = Some(raw_secs);

        let corrected_secs = raw_secs + f64::from(self.wraps) * self.config.wrap_period_secs;
        let offset_ms = self.offset_us.unwrap_or(0.0) / 1000.0;
        snap_ms(self.config.start_epoch_ms as f64 + offset_ms + corrected_secs * 1000.0)
    }
}

impl SampleDecoder for SweetberryDecoder {
    fn decode(&mut self, line_no: usize, line: &str) -> Result<Option<Sample>> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        if self.offset_us.is_none() {
            self.parse_header(line)?;
            return Ok(None);
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != self.rails.len() + 1 {
            log::warn!(
                "line {line_no}: expected {} columns, got {}; skipping",
                self.rails.len() + 1,
                fields.len()
            );
            return Ok(None);
        }

        let raw_secs = parse_field(line_no, "timestamp", fields[0])?;
        let values = fields[1..]
            .iter()
            .map(|f| parse_field(line_no, "rail power", f))
            .collect::<Result<Vec<f64>>>()?;

        Ok(Some(Sample {
            time_ms: self.host_time_ms(raw_secs),
            values,
        }))
    }
}

fn parse_field(line: usize, field: &'static str, raw: &str) -> Result<f64> {
    raw.parse::<f64>().map_err(|_| PowerError::NumberFormat {
        line,
        field,
        value: raw.to_string(),
    })
}

/// Parser for multi-rail power captures.
pub struct SweetberryParser<R> {
    cursor: SampleCursor<R, SweetberryDecoder>,
}

impl<R: BufRead> SweetberryParser<R> {
    pub fn new(reader: R, config: SweetberryConfig) -> Self {
        Self {
            cursor: SampleCursor::new(reader, SweetberryDecoder::new(config)),
        }
    }
}

impl SweetberryParser<BufReader<File>> {
    pub fn from_path(path: &Path, config: SweetberryConfig) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?), config))
    }
}

impl<R: BufRead> RawPowerDataParser for SweetberryParser<R> {
    fn monitor(&self) -> &'static str {
        "sweetberry"
    }

    fn power_measurements(&mut self, intervals: &[TimeInterval]) -> MeasurementPass {
        measure_intervals(&mut self.cursor, intervals, summarize)
    }
}

fn summarize(decoder: &SweetberryDecoder, stats: &[ChannelStats]) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    let mut total = 0.0;
    for (rail, channel) in decoder.rails().iter().zip(stats) {
        out.insert(rail.clone(), channel.mean());
        total += channel.mean();
    }
    out.insert(TOTAL_POWER.to_string(), total);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::validate;

    fn config(start_epoch_ms: i64, wrap_period_secs: f64) -> SweetberryConfig {
        SweetberryConfig {
            wrap_period_secs,
            start_epoch_ms,
        }
    }

    fn intervals(bounds: &[(&str, i64, i64)]) -> Vec<TimeInterval> {
        let mut v: Vec<TimeInterval> = bounds
            .iter()
            .map(|&(tag, s, e)| TimeInterval::with_bounds(tag, s, e))
            .collect();
        validate(&mut v);
        v
    }

    #[test]
    fn header_names_rails() {
        let mut d = SweetberryDecoder::new(SweetberryConfig::default());
        assert!(d.decode(1, "ts:1500us, vbat uW, vdd_cpu uW").unwrap().is_none());
        assert_eq!(d.rails(), &["vbat".to_string(), "vdd_cpu".to_string()]);
    }

    #[test]
    fn bad_header_is_an_error() {
        let mut d = SweetberryDecoder::new(SweetberryConfig::default());
        assert!(matches!(
            d.decode(1, "0.1, 2.0, 3.0"),
            Err(PowerError::Header { .. })
        ));
        let mut d = SweetberryDecoder::new(SweetberryConfig::default());
        assert!(matches!(d.decode(1, "ts:100us"), Err(PowerError::Header { .. })));
    }

    #[test]
    fn anchors_to_epoch_and_offset() {
        let mut d = SweetberryDecoder::new(config(10_000, 100.0));
        d.decode(1, "ts:2000us, vbat uW").unwrap();
        let s = d.decode(2, "0.5, 42.0").unwrap().unwrap();
        // 10_000 + 2 (offset) + 500
        assert!((s.time_ms - 10_502.0).abs() < 1e-9);
        assert_eq!(s.values, vec![42.0]);
    }

    #[test]
    fn wrap_adds_full_period() {
        let mut d = SweetberryDecoder::new(config(0, 10.0));
        d.decode(1, "ts:0us, vbat uW").unwrap();
        let a = d.decode(2, "9.5, 1.0").unwrap().unwrap();
        let b = d.decode(3, "0.5, 1.0").unwrap().unwrap();
        let c = d.decode(4, "9.0, 1.0").unwrap().unwrap();
        let e = d.decode(5, "1.0, 1.0").unwrap().unwrap();
        assert!((a.time_ms - 9_500.0).abs() < 1e-9);
        assert!((b.time_ms - 10_500.0).abs() < 1e-9);
        assert!((c.time_ms - 19_000.0).abs() < 1e-9);
        assert!((e.time_ms - 21_000.0).abs() < 1e-9);
        assert_eq!(d.wraps(), 2);
    }

    #[test]
    fn wrong_column_count_is_skipped_bad_number_is_fatal() {
        let mut d = SweetberryDecoder::new(SweetberryConfig::default());
        d.decode(1, "ts:0us, vbat uW, vsys uW").unwrap();
        assert!(d.decode(2, "0.1, 1.0").unwrap().is_none());
        assert!(matches!(
            d.decode(3, "0.1, 1.0, x"),
            Err(PowerError::NumberFormat { line: 3, .. })
        ));
    }

    #[test]
    fn per_rail_averages_and_total() {
        let raw = "\
            ts:0us, vbat uW, vsys uW\n\
            1.0, 100.0, 10.0\n\
            2.0, 300.0, 30.0\n\
            3.0, 999.0, 99.0\n";
        let mut p = SweetberryParser::new(raw.as_bytes(), config(0, 4_294.967_296));
        assert_eq!(p.monitor(), "sweetberry");
        let m = p
            .power_measurements(&intervals(&[("Idle", 1000, 2000)]))
            .into_result()
            .unwrap();
        assert!(m[0].interval.is_valid());
        assert!((m[0].statistics["vbat"] - 200.0).abs() < 1e-9);
        assert!((m[0].statistics["vsys"] - 20.0).abs() < 1e-9);
        assert!((m[0].statistics[TOTAL_POWER] - 220.0).abs() < 1e-9);
    }

    #[test]
    fn interval_spanning_wrap_is_measured() {
        let raw = "ts:0us, vbat uW\n9.0, 1.0\n9.9, 2.0\n0.2, 4.0\n0.9, 8.0\n";
        let mut p = SweetberryParser::new(raw.as_bytes(), config(0, 10.0));
        let m = p
            .power_measurements(&intervals(&[("Span", 9_800, 10_500)]))
            .into_result()
            .unwrap();
        assert!(m[0].interval.is_valid());
        assert!((m[0].statistics["vbat"] - 3.0).abs() < 1e-9);
    }
}
