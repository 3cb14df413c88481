//! Single-channel Monsoon captures: `<epoch-seconds> <current-amps>` per line.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use regex::Regex;

use super::{
    ChannelStats, MeasurementPass, RawPowerDataParser, Sample, SampleCursor, SampleDecoder,
    measure_intervals, snap_ms,
};
use crate::error::{PowerError, Result};
use crate::interval::TimeInterval;

pub const AVERAGE_CURRENT: &str = "average current mA";
pub const MIN_CURRENT: &str = "min current mA";
pub const MAX_CURRENT: &str = "max current mA";
pub const STDEV_CURRENT: &str = "stdev current mA";

/// Decodes Monsoon lines into milliseconds and milliamps.
///
/// Lines that do not look like two numeric tokens are skipped. A line that
/// does but fails to parse is a fatal format error.
#[derive(Debug, Clone)]
pub struct MonsoonDecoder {
    line_re: Regex,
}

impl Default for MonsoonDecoder {
    fn default() -> Self {
        Self {
            line_re: Regex::new(r"^\s*([0-9.eE+-]+)\s+([0-9.eE+-]+)\s*$")
                .expect("static monsoon line pattern"),
        }
    }
}

impl SampleDecoder for MonsoonDecoder {
    fn decode(&mut self, line_no: usize, line: &str) -> Result<Option<Sample>> {
        let Some(caps) = self.line_re.captures(line) else {
            return Ok(None);
        };
        let secs = parse_field(line_no, "time", &caps[1])?;
        let amps = parse_field(line_no, "current", &caps[2])?;
        Ok(Some(Sample {
            time_ms: snap_ms(secs * 1000.0),
            values: vec![amps * 1000.0],
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

/// Parser for single-channel current captures.
pub struct MonsoonParser<R> {
    cursor: SampleCursor<R, MonsoonDecoder>,
}

impl<R: BufRead> MonsoonParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            cursor: SampleCursor::new(reader, MonsoonDecoder::default()),
        }
    }
}

impl MonsoonParser<BufReader<File>> {
    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> RawPowerDataParser for MonsoonParser<R> {
    fn monitor(&self) -> &'static str {
        "monsoon"
    }

    fn power_measurements(&mut self, intervals: &[TimeInterval]) -> MeasurementPass {
        measure_intervals(&mut self.cursor, intervals, summarize)
    }
}

fn summarize(_: &MonsoonDecoder, stats: &[ChannelStats]) -> BTreeMap<String, f64> {
    let Some(current) = stats.first() else {
        return BTreeMap::new();
    };
    BTreeMap::from([
        (AVERAGE_CURRENT.to_string(), current.mean()),
        (MIN_CURRENT.to_string(), current.min),
        (MAX_CURRENT.to_string(), current.max),
        (STDEV_CURRENT.to_string(), current.std_dev()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::{REASON_EOF, validate};

    fn intervals(bounds: &[(&str, i64, i64)]) -> Vec<TimeInterval> {
        let mut v: Vec<TimeInterval> = bounds
            .iter()
            .map(|&(tag, s, e)| TimeInterval::with_bounds(tag, s, e))
            .collect();
        validate(&mut v);
        v
    }

    #[test]
    fn decoder_converts_units() {
        let mut d = MonsoonDecoder::default();
        let s = d.decode(1, "1.5 0.25").unwrap().unwrap();
        assert!((s.time_ms - 1500.0).abs() < 1e-9);
        assert!((s.values[0] - 250.0).abs() < 1e-9);
    }

    #[test]
    fn decoder_skips_non_sample_lines() {
        let mut d = MonsoonDecoder::default();
        assert!(d.decode(1, "Time Current").unwrap().is_none());
        assert!(d.decode(2, "").unwrap().is_none());
        assert!(d.decode(3, "1.0 2.0 3.0").unwrap().is_none());
    }

    #[test]
    fn decoder_fails_on_malformed_number() {
        let mut d = MonsoonDecoder::default();
        let err = d.decode(4, "1.0.0 2.0").unwrap_err();
        assert!(matches!(
            err,
            PowerError::NumberFormat {
                line: 4,
                field: "time",
                ..
            }
        ));
    }

    #[test]
    fn boundary_sample_at_end_is_included() {
        let raw = "1.0 1.56\n1.002 2.0\n1.006 3.0\n";
        let mut p = MonsoonParser::new(raw.as_bytes());
        let m = p
            .power_measurements(&intervals(&[("Foo", 1000, 1005)]))
            .into_result()
            .unwrap();
        assert_eq!(m.len(), 1);
        assert!(m[0].interval.is_valid());
        assert!((m[0].statistics[AVERAGE_CURRENT] - 1780.0).abs() < 1e-6);
        assert!((m[0].statistics[MIN_CURRENT] - 1560.0).abs() < 1e-6);
        assert!((m[0].statistics[MAX_CURRENT] - 2000.0).abs() < 1e-6);
        assert!((m[0].statistics[STDEV_CURRENT] - 220.0).abs() < 1e-6);
    }

    #[test]
    fn samples_exactly_on_both_bounds_are_included() {
        // 1.001 s and 1.005 s do not survive a bare `* 1000.0` exactly.
        let raw = "1.000 9.0\n1.001 1.0\n1.002 2.0\n1.003 3.0\n1.004 9.0\n";
        let mut p = MonsoonParser::new(raw.as_bytes());
        let m = p
            .power_measurements(&intervals(&[("Foo", 1001, 1003)]))
            .into_result()
            .unwrap();
        assert!(m[0].interval.is_valid());
        assert!((m[0].statistics[AVERAGE_CURRENT] - 2000.0).abs() < 1e-6);

        let raw = "1.000 1.0\n1.005 3.0\n";
        let mut p = MonsoonParser::new(raw.as_bytes());
        let m = p
            .power_measurements(&intervals(&[("Bar", 1000, 1005)]))
            .into_result()
            .unwrap();
        assert!(m[0].interval.is_valid(), "{}", m[0].interval.reason);
        assert!((m[0].statistics[AVERAGE_CURRENT] - 2000.0).abs() < 1e-6);
    }

    #[test]
    fn fatal_error_propagates() {
        let raw = "1.0 1.0\n1.001 1e+e\n1.010 1.0\n";
        let mut p = MonsoonParser::new(raw.as_bytes());
        let err = p
            .power_measurements(&intervals(&[("Foo", 1000, 1005)]))
            .into_result()
            .unwrap_err();
        assert!(matches!(err, PowerError::NumberFormat { line: 2, .. }));
    }

    #[test]
    fn truncated_capture_invalidates_tail_interval() {
        let raw = "1.0 1.0\n1.010 1.0\n1.020 1.0\n";
        let mut p = MonsoonParser::new(raw.as_bytes());
        let m = p
            .power_measurements(&intervals(&[("A", 1000, 1010), ("B", 1015, 1100)]))
            .into_result()
            .unwrap();
        assert!(m[0].interval.is_valid());
        assert!(m[1].interval.is_invalid());
        assert_eq!(m[1].interval.reason, REASON_EOF);
    }

    #[test]
    fn from_path_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("monsoon.txt");
        std::fs::write(&path, "1.0 1.0\n2.0 1.0\n").unwrap();
        let mut p = MonsoonParser::from_path(&path).unwrap();
        assert_eq!(p.monitor(), "monsoon");
        let m = p
            .power_measurements(&intervals(&[("A", 1000, 2000)]))
            .into_result()
            .unwrap();
        assert!((m[0].statistics[AVERAGE_CURRENT] - 1000.0).abs() < 1e-9);
    }
}
