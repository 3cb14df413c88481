//! Raw power-monitor sample parsing.
//!
//! Architecture:
//! 1. A [`SampleDecoder`] turns one text line into an optional [`Sample`]
//!    (host time in epoch ms plus one value per channel)
//! 2. A [`SampleCursor`] walks the decoded stream forward, one sample of
//!    look-ahead, never rewinding
//! 3. [`measure_intervals`] visits valid intervals in ascending start order and
//!    folds the samples inside each `[start, end]` window into [`ChannelStats`]
//! 4. Each monitor type turns the folded stats into named statistics
//!
//! Both bounds are inclusive. The first sample past `end` stops accumulation
//! and stays on the cursor for the next interval. An interval the stream never
//! reaches the end of is invalidated rather than reported short.

pub mod monsoon;
pub mod sweetberry;

use std::collections::BTreeMap;
use std::io::BufRead;

use crate::aggregate::Measurement;
use crate::error::{PowerError, Result};
use crate::interval::{REASON_EOF, TimeInterval, valid_sorted};
use crate::lines::LossyLines;

pub use monsoon::MonsoonParser;
pub use sweetberry::SweetberryParser;

/// Reason attached when an interval's window holds no samples at all.
pub const REASON_NO_SAMPLES: &str = "no samples within interval";
/// Reason attached to intervals left unmeasured after a fatal capture error.
pub const REASON_ABORTED: &str = "raw data unreadable before interval's end time";

// ---------------------------------------------------------------------------
// Parser contract
// ---------------------------------------------------------------------------

/// Turns a raw capture into one [`Measurement`] per valid interval.
///
/// Implementations own a single-pass stream, so each parser instance answers
/// once. Intervals that are not `Valid` are skipped; the rest are measured in
/// ascending start order regardless of the order they are passed in.
pub trait RawPowerDataParser {
    /// Short monitor name used in logs and reports.
    fn monitor(&self) -> &'static str;

    fn power_measurements(&mut self, intervals: &[TimeInterval]) -> MeasurementPass;
}

/// Outcome of one pass over a capture.
///
/// A fatal error stops the pass but keeps every interval measured before it.
/// The interval being read and all later ones come back invalid with
/// [`REASON_ABORTED`].
#[derive(Debug, Default)]
pub struct MeasurementPass {
    pub measurements: Vec<Measurement>,
    pub error: Option<PowerError>,
}

impl MeasurementPass {
    /// All-or-nothing view: the measurements, or the error that cut the pass short.
    pub fn into_result(self) -> Result<Vec<Measurement>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.measurements),
        }
    }
}

/// Snap a millisecond time onto the microsecond grid.
///
/// Sample clocks are written in decimal seconds; `1.001 * 1000.0` lands just
/// below `1001.0`. Interval bounds are whole milliseconds, so times must be
/// exact at that resolution for the inclusive bounds to hold.
pub fn snap_ms(ms: f64) -> f64 {
    (ms * 1000.0).round() / 1000.0
}

// ---------------------------------------------------------------------------
// Samples and decoding
// ---------------------------------------------------------------------------

/// One decoded raw sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Host time in epoch milliseconds.
    pub time_ms: f64,
    pub values: Vec<f64>,
}

/// Decodes one raw line. `Ok(None)` means "not a sample line, skip it".
pub trait SampleDecoder {
    fn decode(&mut self, line_no: usize, line: &str) -> Result<Option<Sample>>;
}

/// Forward-only cursor with one sample of look-ahead.
pub struct SampleCursor<R, D> {
    lines: LossyLines<R>,
    line_no: usize,
    decoder: D,
    pending: Option<Sample>,
    consumed: u64,
}

impl<R: BufRead, D: SampleDecoder> SampleCursor<R, D> {
    pub fn new(reader: R, decoder: D) -> Self {
        Self {
            lines: LossyLines::new(reader),
            line_no: 0,
            decoder,
            pending: None,
            consumed: 0,
        }
    }

    /// The next sample, without consuming it. `None` at end of stream.
    pub fn peek(&mut self) -> Result<Option<&Sample>> {
        while self.pending.is_none() {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            let line = line?;
            self.line_no += 1;
            self.pending = self.decoder.decode(self.line_no, &line)?;
        }
        Ok(self.pending.as_ref())
    }

    /// Drop the sample returned by the last `peek`.
    pub fn advance(&mut self) {
        if self.pending.take().is_some() {
            self.consumed += 1;
        }
    }

    /// Samples consumed so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }
}

// ---------------------------------------------------------------------------
// Per-channel statistics
// ---------------------------------------------------------------------------

/// Streaming mean/min/max/population-stdev for one channel (Welford).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub count: u64,
    mean: f64,
    m2: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl ChannelStats {
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.m2 / self.count as f64).max(0.0).sqrt()
    }
}

// ---------------------------------------------------------------------------
// Interval scan
// ---------------------------------------------------------------------------

/// Measure every valid interval against the cursor.
///
/// `summarize` maps the per-channel stats of a non-empty window to named
/// statistics.
pub fn measure_intervals<R, D, F>(
    cursor: &mut SampleCursor<R, D>,
    intervals: &[TimeInterval],
    summarize: F,
) -> MeasurementPass
where
    R: BufRead,
    D: SampleDecoder,
    F: Fn(&D, &[ChannelStats]) -> BTreeMap<String, f64>,
{
    let mut ordered = valid_sorted(intervals).into_iter();
    let mut pass = MeasurementPass {
        measurements: Vec::with_capacity(intervals.len()),
        error: None,
    };

    for interval in ordered.by_ref() {
        match measure_one(cursor, interval.clone(), &summarize) {
            Ok(m) => pass.measurements.push(m),
            Err(e) => {
                log::error!("{}: capture unreadable: {e}", interval.tag);
                pass.measurements.push(aborted(interval));
                pass.error = Some(e);
                break;
            }
        }
    }
    pass.measurements.extend(ordered.map(aborted));

    log::info!(
        "measured {} interval(s) from {} consumed sample(s)",
        pass.measurements.len(),
        cursor.consumed()
    );
    pass
}

fn measure_one<R, D, F>(
    cursor: &mut SampleCursor<R, D>,
    mut interval: TimeInterval,
    summarize: &F,
) -> Result<Measurement>
where
    R: BufRead,
    D: SampleDecoder,
    F: Fn(&D, &[ChannelStats]) -> BTreeMap<String, f64>,
{
    let (Some(start), Some(end)) = (interval.start_ms, interval.end_ms) else {
        interval.mark_invalid(crate::interval::REASON_UNDEFINED);
        return Ok(Measurement::without_statistics(interval));
    };
    let (start, end) = (start as f64, end as f64);

    let mut stats: Vec<ChannelStats> = Vec::new();
    let mut reached_end = false;
    while let Some(sample) = cursor.peek()? {
        let t = sample.time_ms;
        if t > end {
            reached_end = true;
            break;
        }
        if t >= start {
            if stats.len() < sample.values.len() {
                stats.resize(sample.values.len(), ChannelStats::default());
            }
            for (channel, &v) in stats.iter_mut().zip(&sample.values) {
                channel.push(v);
            }
            reached_end = t >= end;
        }
        cursor.advance();
    }

    if !reached_end {
        log::warn!("{}: {}", interval.tag, REASON_EOF);
        interval.mark_invalid(REASON_EOF);
        return Ok(Measurement::without_statistics(interval));
    }
    if stats.iter().all(|c| c.count == 0) {
        log::warn!("{}: {}", interval.tag, REASON_NO_SAMPLES);
        interval.mark_invalid(REASON_NO_SAMPLES);
        return Ok(Measurement::without_statistics(interval));
    }

    let statistics = summarize(cursor.decoder(), &stats);
    log::debug!(
        "{}: {} sample(s), {} statistic(s)",
        interval.tag,
        stats.first().map_or(0, |c| c.count),
        statistics.len()
    );
    Ok(Measurement::new(interval, statistics))
}

fn aborted(mut interval: TimeInterval) -> Measurement {
    interval.mark_invalid(REASON_ABORTED);
    Measurement::without_statistics(interval)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
