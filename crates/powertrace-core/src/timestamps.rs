//! Device-side test-boundary log parsing.
//!
//! The device writes one line per boundary: `<epoch-ms> <MARKER> <tag>`. Lines
//! carrying the start marker set a tag's start time, lines carrying the end
//! marker set its end time; the last occurrence wins. Everything else is
//! ignored.

use std::collections::HashMap;
use std::io::BufRead;

use regex::Regex;

use crate::config::MarkerConfig;
use crate::error::{PowerError, Result};
use crate::interval::TimeInterval;
use crate::lines::LossyLines;

/// Parses boundary markers into one [`TimeInterval`] per tag.
#[derive(Debug, Clone)]
pub struct TimestampExtractor {
    start: Regex,
    end: Regex,
}

impl TimestampExtractor {
    /// Build an extractor for the given start/end marker words.
    pub fn new(markers: &MarkerConfig) -> Result<Self> {
        Ok(Self {
            start: marker_regex(&markers.start)?,
            end: marker_regex(&markers.end)?,
        })
    }

    /// Read the whole stream and return intervals in first-seen order.
    ///
    /// Unparseable timestamps are logged and skipped, as are lines whose bytes
    /// are not UTF-8. Only read failures are errors.
    pub fn extract<R: BufRead>(&self, reader: R) -> Result<Vec<TimeInterval>> {
        let mut intervals: Vec<TimeInterval> = Vec::new();
        let mut by_tag: HashMap<String, usize> = HashMap::new();

        for (idx, line) in LossyLines::new(reader).enumerate() {
            let line = line?;
            let (caps, is_start) = if let Some(c) = self.start.captures(&line) {
                (c, true)
            } else if let Some(c) = self.end.captures(&line) {
                (c, false)
            } else {
                continue;
            };

            let raw_ts = &caps[1];
            let Ok(ts) = raw_ts.parse::<i64>() else {
                log::warn!("line {}: skipping marker with bad timestamp '{raw_ts}'", idx + 1);
                continue;
            };
            let tag = &caps[2];

            let slot = *by_tag.entry(tag.to_string()).or_insert_with(|| {
                intervals.push(TimeInterval::new(tag));
                intervals.len() - 1
            });
            if is_start {
                intervals[slot].start_ms = Some(ts);
            } else {
                intervals[slot].end_ms = Some(ts);
            }
        }

        log::info!("extracted {} interval(s) from boundary log", intervals.len());
        Ok(intervals)
    }

    /// Convenience wrapper for in-memory logs.
    pub fn extract_str(&self, text: &str) -> Result<Vec<TimeInterval>> {
        self.extract(text.as_bytes())
    }
}

fn marker_regex(marker: &str) -> Result<Regex> {
    let pattern = format!(r"^\s*(\S+)\s+{}\s+(\S+)\s*$", regex::escape(marker));
    Regex::new(&pattern).map_err(|e| PowerError::config(format!("marker '{marker}': {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
