//! Half-open temporal intervals
//!
//! `[start, end)`, with `end = None` meaning the interval is still open.
//! Used for both valid time and transaction time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A half-open `[start, end)` interval of UTC instants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// An open interval starting at `start`.
    pub fn open_from(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }

    /// A closed interval. `end` earlier than `start` collapses to empty.
    pub fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: Some(end.max(start)),
        }
    }

    #[inline]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    #[inline]
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.end, Some(end) if end <= self.start)
    }

    /// `start <= instant < end`
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && self.end.map_or(true, |end| instant < end)
    }

    /// True if both intervals share at least one instant.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let starts_before_other_ends = other.end.map_or(true, |end| self.start < end);
        let other_starts_before_self_ends = self.end.map_or(true, |end| other.start < end);
        starts_before_other_ends && other_starts_before_self_ends
    }

    /// Returns this interval closed at `at`.
    ///
    /// The close instant never precedes `start`.
    pub fn closed_at(&self, at: DateTime<Utc>) -> Self {
        Self::closed(self.start, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_half_open_containment() {
        let range = TimeRange::closed(t(0), t(10));
        assert!(range.contains(t(0)));
        assert!(range.contains(t(9)));
        assert!(!range.contains(t(10)));
        assert!(!range.contains(t(-1)));
    }

    #[test]
    fn test_open_range_contains_future() {
        let range = TimeRange::open_from(t(0));
        assert!(range.is_open());
        assert!(range.contains(t(0) + Duration::days(3650)));
    }

    #[test]
    fn test_closed_at_never_inverts() {
        let range = TimeRange::open_from(t(10)).closed_at(t(5));
        assert_eq!(range.end(), Some(t(10)));
        assert!(range.is_empty());
        assert!(!range.contains(t(10)));
    }

    #[test]
    fn test_overlaps() {
        let a = TimeRange::closed(t(0), t(10));
        let b = TimeRange::closed(t(10), t(20));
        let c = TimeRange::open_from(t(5));

        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
        assert!(!TimeRange::closed(t(3), t(3)).overlaps(&c));
    }
}
