//! Test-case measurement windows and their validation.
//!
//! A [`TimeInterval`] is created by the timestamp extractor the first time a
//! start or end marker for its tag shows up. [`validate`] then assigns every
//! interval a terminal status. After validation intervals are read-only, except
//! that a sample parser may still invalidate one whose end was never reached.

use serde::{Deserialize, Serialize};

/// Reason attached to intervals missing either bound.
pub const REASON_UNDEFINED: &str = "start or end time isn't defined";
/// Reason attached to intervals whose start is after their end.
pub const REASON_INVERTED: &str = "start time greater than end time";
/// Reason attached to every party of an overlap.
pub const REASON_INTERSECTED: &str = "intersected with some other measurement";
/// Reason attached when the raw sample stream ends inside an interval.
pub const REASON_EOF: &str = "reached end of file before interval's end time";
/// Reason attached to intervals that pass every check.
pub const REASON_VALID: &str = "valid";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Validity of a measurement window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IntervalStatus {
    #[default]
    Unknown,
    Valid,
    Invalid,
}

impl std::fmt::Display for IntervalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Unknown => "unknown",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
        })
    }
}

/// One test case's measurement window, in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub tag: String,
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
    pub status: IntervalStatus,
    /// Explains the last status transition.
    pub reason: String,
}

impl TimeInterval {
    /// Create an interval with no bounds and `Unknown` status.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            start_ms: None,
            end_ms: None,
            status: IntervalStatus::Unknown,
            reason: String::new(),
        }
    }

    /// Create an interval with both bounds set.
    pub fn with_bounds(tag: impl Into<String>, start_ms: i64, end_ms: i64) -> Self {
        Self {
            start_ms: Some(start_ms),
            end_ms: Some(end_ms),
            ..Self::new(tag)
        }
    }

    /// `end - start`, when both bounds are known.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.start_ms, self.end_ms) {
            (Some(s), Some(e)) => Some(e - s),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == IntervalStatus::Valid
    }

    pub fn is_invalid(&self) -> bool {
        self.status == IntervalStatus::Invalid
    }

    /// Inclusive membership test on both bounds.
    pub fn contains_ms(&self, t_ms: f64) -> bool {
        match (self.start_ms, self.end_ms) {
            (Some(s), Some(e)) => s as f64 <= t_ms && t_ms <= e as f64,
            _ => false,
        }
    }

    pub fn mark_valid(&mut self) {
        self.status = IntervalStatus::Valid;
        self.reason = REASON_VALID.to_string();
    }

    pub fn mark_invalid(&mut self, reason: &str) {
        self.status = IntervalStatus::Invalid;
        self.reason = reason.to_string();
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Assign a terminal status to every interval, in place.
///
/// Checks run in order: completeness, ordering, overlap. Overlap is judged
/// among the survivors of the first two checks, sorted stably by start time;
/// any pair where the later one starts before the earlier one ends marks both
/// invalid. Whatever is left becomes valid.
pub fn validate(intervals: &mut [TimeInterval]) {
    for interval in intervals.iter_mut() {
        if interval.start_ms.is_none() || interval.end_ms.is_none() {
            interval.mark_invalid(REASON_UNDEFINED);
        }
    }

    for interval in intervals.iter_mut().filter(|i| !i.is_invalid()) {
        if interval.start_ms > interval.end_ms {
            interval.mark_invalid(REASON_INVERTED);
        }
    }

    // (index, start, end) of the survivors, stable-sorted by start.
    let mut order: Vec<(usize, i64, i64)> = intervals
        .iter()
        .enumerate()
        .filter(|(_, i)| !i.is_invalid())
        .filter_map(|(idx, i)| Some((idx, i.start_ms?, i.end_ms?)))
        .collect();
    order.sort_by_key(|&(_, start, _)| start);

    let mut intersected = vec![false; intervals.len()];
    for (pos, &(idx_i, _, end_i)) in order.iter().enumerate() {
        // Starts are ascending, so the first later start at or past end_i
        // closes the scan for this interval.
        for &(idx_j, start_j, _) in &order[pos + 1..] {
            if start_j >= end_i {
                break;
            }
            intersected[idx_i] = true;
            intersected[idx_j] = true;
        }
    }

    for (idx, interval) in intervals.iter_mut().enumerate() {
        if intersected[idx] {
            interval.mark_invalid(REASON_INTERSECTED);
        } else if interval.status == IntervalStatus::Unknown {
            interval.mark_valid();
        }
    }

    let valid = intervals.iter().filter(|i| i.is_valid()).count();
    log::info!(
        "validated {} interval(s): {} valid, {} invalid",
        intervals.len(),
        valid,
        intervals.len() - valid
    );
}

/// Valid intervals sorted ascending by start time, as sample parsers expect.
pub fn valid_sorted(intervals: &[TimeInterval]) -> Vec<TimeInterval> {
    let mut valid: Vec<TimeInterval> = intervals.iter().filter(|i| i.is_valid()).cloned().collect();
    valid.sort_by_key(|i| i.start_ms);
    valid
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn statuses(intervals: &[TimeInterval]) -> Vec<IntervalStatus> {
        intervals.iter().map(|i| i.status).collect()
    }

    // -----------------------------------------------------------------------
    // TimeInterval
    // -----------------------------------------------------------------------

    #[test]
    fn duration_requires_both_bounds() {
        let mut i = TimeInterval::new("Foo");
        assert_eq!(i.duration_ms(), None);
        i.start_ms = Some(1000);
        assert_eq!(i.duration_ms(), None);
        i.end_ms = Some(1005);
        assert_eq!(i.duration_ms(), Some(5));
    }

    #[test]
    fn contains_is_inclusive_at_both_ends() {
        let i = TimeInterval::with_bounds("Foo", 1000, 1005);
        assert!(i.contains_ms(1000.0));
        assert!(i.contains_ms(1005.0));
        assert!(!i.contains_ms(999.9));
        assert!(!i.contains_ms(1005.1));
    }

    // -----------------------------------------------------------------------
    // validate
    // -----------------------------------------------------------------------

    #[test]
    fn missing_bound_is_invalid() {
        let mut only_start = TimeInterval::new("A");
        only_start.start_ms = Some(10);
        let mut only_end = TimeInterval::new("B");
        only_end.end_ms = Some(10);
        let mut v = vec![only_start, only_end];
        validate(&mut v);
        assert_eq!(statuses(&v), vec![IntervalStatus::Invalid; 2]);
        assert_eq!(v[0].reason, REASON_UNDEFINED);
        assert_eq!(v[1].reason, REASON_UNDEFINED);
    }

    #[test]
    fn inverted_interval_is_invalid() {
        let mut v = vec![TimeInterval::with_bounds("A", 20, 10)];
        validate(&mut v);
        assert!(v[0].is_invalid());
        assert_eq!(v[0].reason, REASON_INVERTED);
    }

    #[test]
    fn zero_length_interval_is_valid() {
        let mut v = vec![TimeInterval::with_bounds("A", 10, 10)];
        validate(&mut v);
        assert!(v[0].is_valid());
    }

    #[test]
    fn overlap_invalidates_both_and_spares_third() {
        let mut v = vec![
            TimeInterval::with_bounds("A", 0, 100),
            TimeInterval::with_bounds("B", 50, 150),
            TimeInterval::with_bounds("C", 200, 300),
        ];
        validate(&mut v);
        assert_eq!(
            statuses(&v),
            vec![
                IntervalStatus::Invalid,
                IntervalStatus::Invalid,
                IntervalStatus::Valid
            ]
        );
        assert_eq!(v[0].reason, REASON_INTERSECTED);
        assert_eq!(v[1].reason, REASON_INTERSECTED);
    }

    #[test]
    fn overlap_is_all_pairs_not_adjacent_only() {
        // A spans both B and C; B and C do not touch each other.
        let mut v = vec![
            TimeInterval::with_bounds("C", 60, 90),
            TimeInterval::with_bounds("A", 0, 100),
            TimeInterval::with_bounds("B", 10, 20),
        ];
        validate(&mut v);
        assert!(v.iter().all(|i| i.is_invalid()));
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let mut v = vec![
            TimeInterval::with_bounds("A", 0, 100),
            TimeInterval::with_bounds("B", 100, 200),
        ];
        validate(&mut v);
        assert!(v.iter().all(|i| i.is_valid()));
    }

    #[test]
    fn invalid_intervals_do_not_cause_overlaps() {
        let mut v = vec![
            TimeInterval::with_bounds("A", 0, 100),
            TimeInterval::with_bounds("X", 150, 20),
            TimeInterval::with_bounds("B", 100, 200),
        ];
        validate(&mut v);
        assert!(v[0].is_valid());
        assert_eq!(v[1].reason, REASON_INVERTED);
        assert!(v[2].is_valid());
    }

    #[test]
    fn valid_sorted_filters_and_orders() {
        let mut v = vec![
            TimeInterval::with_bounds("late", 500, 600),
            TimeInterval::with_bounds("early", 0, 100),
            TimeInterval::new("broken"),
        ];
        validate(&mut v);
        let sorted = valid_sorted(&v);
        let tags: Vec<&str> = sorted.iter().map(|i| i.tag.as_str()).collect();
        assert_eq!(tags, vec!["early", "late"]);
    }
}
