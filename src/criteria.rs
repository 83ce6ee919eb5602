//! Message filter.

use crate::time::{parse_canonical, to_canonical};
use chrono::{DateTime, FixedOffset, Timelike};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CriteriaError {
    #[error("hour range `{0}` is not of the form HH-HH")]
    HourRangeFormat(String),

    #[error("hour {0} is outside 0-23")]
    HourOutOfRange(u32),
}

/// Hours of the day `[start, end)`; wraps past midnight when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourRange {
    start: u32,
    end: u32,
}

impl HourRange {
    /// # Errors
    ///
    /// Returns an error if either bound is 24 or more.
    pub fn new(start: u32, end: u32) -> Result<Self, CriteriaError> {
        for hour in [start, end] {
            if hour >= 24 {
                return Err(CriteriaError::HourOutOfRange(hour));
            }
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn contains(self, hour: u32) -> bool {
        if self.start <= self.end {
            self.start <= hour && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }

    /// Tests the hour of `instant` at the canonical offset.
    #[must_use]
    pub fn contains_instant(self, instant: &DateTime<FixedOffset>) -> bool {
        self.contains(to_canonical(instant).hour())
    }
}

impl FromStr for HourRange {
    type Err = CriteriaError;

    /// `8-17`, `22-6`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format_error = || CriteriaError::HourRangeFormat(s.to_string());
        let (start, end) = s.split_once('-').ok_or_else(format_error)?;
        let start = start.trim().parse().map_err(|_| format_error())?;
        let end = end.trim().parse().map_err(|_| format_error())?;
        Self::new(start, end)
    }
}

impl fmt::Display for HourRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// The normalized fields of one message, as the filter sees them.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub sender: &'a str,
    pub recipients: &'a [String],
    pub subject: &'a str,
    pub body: &'a str,
    pub sent: Option<&'a DateTime<FixedOffset>>,
    pub received: Option<&'a DateTime<FixedOffset>>,
}

/// Composite filter; every predicate that is set must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub sent_after: Option<DateTime<FixedOffset>>,
    pub sent_before: Option<DateTime<FixedOffset>>,
    pub received_after: Option<DateTime<FixedOffset>>,
    pub received_before: Option<DateTime<FixedOffset>>,
    pub sent_hours: Option<HourRange>,
    pub received_hours: Option<HourRange>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Inclusive window check. A missing instant never excludes.
fn within(
    instant: Option<&DateTime<FixedOffset>>,
    after: Option<&DateTime<FixedOffset>>,
    before: Option<&DateTime<FixedOffset>>,
    hours: Option<HourRange>,
) -> bool {
    let Some(instant) = instant.map(to_canonical) else {
        return true;
    };
    if after.is_some_and(|after| instant < to_canonical(after)) {
        return false;
    }
    if before.is_some_and(|before| instant > to_canonical(before)) {
        return false;
    }
    hours.map_or(true, |range| range.contains_instant(&instant))
}

impl FilterCriteria {
    /// Whether no predicate is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    #[must_use]
    pub fn matches(&self, candidate: &Candidate<'_>) -> bool {
        if let Some(sender) = &self.sender {
            if !contains_ci(candidate.sender, sender) {
                return false;
            }
        }
        if let Some(recipient) = &self.recipient {
            if !candidate.recipients.iter().any(|to| contains_ci(to, recipient)) {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if !contains_ci(candidate.subject, subject) {
                return false;
            }
        }
        if let Some(body) = &self.body {
            if !contains_ci(candidate.body, body) {
                return false;
            }
        }
        within(
            candidate.received,
            self.received_after.as_ref(),
            self.received_before.as_ref(),
            self.received_hours,
        ) && within(
            candidate.sent,
            self.sent_after.as_ref(),
            self.sent_before.as_ref(),
            self.sent_hours,
        )
    }
}

/// Raw filter values as typed on the command line.
#[derive(Debug, Clone, Default)]
pub struct RawCriteria {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub sent_after: Option<String>,
    pub sent_before: Option<String>,
    pub received_after: Option<String>,
    pub received_before: Option<String>,
    pub sent_time: Option<String>,
    pub received_time: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn date_predicate(flag: &str, value: Option<&str>) -> Option<DateTime<FixedOffset>> {
    let value = value.filter(|v| !v.is_empty())?;
    let parsed = parse_canonical(value);
    if parsed.is_none() {
        warn!(flag, value, "unrecognized date, filter ignored");
    }
    parsed
}

fn hour_predicate(flag: &str, value: Option<&str>) -> Option<HourRange> {
    let value = value.filter(|v| !v.is_empty())?;
    match value.parse() {
        Ok(range) => Some(range),
        Err(err) => {
            warn!(flag, error = %err, "invalid hour range, filter ignored");
            None
        }
    }
}

impl From<RawCriteria> for FilterCriteria {
    /// Invalid dates and hour ranges are logged and left out.
    fn from(raw: RawCriteria) -> Self {
        Self {
            sent_after: date_predicate("sent-after", raw.sent_after.as_deref()),
            sent_before: date_predicate("sent-before", raw.sent_before.as_deref()),
            received_after: date_predicate("received-after", raw.received_after.as_deref()),
            received_before: date_predicate("received-before", raw.received_before.as_deref()),
            sent_hours: hour_predicate("sent-time", raw.sent_time.as_deref()),
            received_hours: hour_predicate("received-time", raw.received_time.as_deref()),
            sender: non_empty(raw.sender),
            recipient: non_empty(raw.recipient),
            subject: non_empty(raw.subject),
            body: non_empty(raw.body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Timestamp;
    use chrono::{NaiveDateTime, TimeZone, Utc};
    use proptest::prelude::*;

    fn utc(s: &str) -> DateTime<FixedOffset> {
        let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap();
        Timestamp::from(naive).to_canonical()
    }

    fn candidate<'a>(
        recipients: &'a [String],
        sent: Option<&'a DateTime<FixedOffset>>,
        received: Option<&'a DateTime<FixedOffset>>,
    ) -> Candidate<'a> {
        Candidate {
            sender: "\"Jane Doe\" <jane@x.com>",
            recipients,
            subject: "Hello",
            body: "Quarterly numbers attached",
            sent,
            received,
        }
    }

    #[test]
    fn test_hour_range_daytime() {
        let range = HourRange::new(8, 17).unwrap();
        assert!(range.contains(8));
        assert!(range.contains(16));
        assert!(!range.contains(17));
        assert!(!range.contains(7));
    }

    #[test]
    fn test_hour_range_wraps_midnight() {
        let range = HourRange::new(22, 6).unwrap();
        assert!(range.contains(23));
        assert!(range.contains(2));
        assert!(range.contains(22));
        assert!(!range.contains(10));
        assert!(!range.contains(21));
        assert!(!range.contains(6));
    }

    #[test]
    fn test_hour_range_parse() {
        assert_eq!("8-17".parse::<HourRange>(), HourRange::new(8, 17));
        assert_eq!(" 22 - 6 ".parse::<HourRange>(), HourRange::new(22, 6));
        assert_eq!(
            "8".parse::<HourRange>(),
            Err(CriteriaError::HourRangeFormat("8".into()))
        );
        assert_eq!(
            "8-x".parse::<HourRange>(),
            Err(CriteriaError::HourRangeFormat("8-x".into()))
        );
        assert_eq!("8-24".parse::<HourRange>(), Err(CriteriaError::HourOutOfRange(24)));
        assert_eq!(HourRange::new(22, 6).unwrap().to_string(), "22-6");
    }

    #[test]
    fn test_hour_is_taken_at_canonical_offset() {
        // 05:30 UTC is 08:30 at UTC+3.
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 5, 30, 0).unwrap();
        assert!(HourRange::new(8, 17).unwrap().contains_instant(&at.fixed_offset()));
    }

    #[test]
    fn test_empty_criteria_match_everything() {
        let criteria = FilterCriteria::default();
        assert!(criteria.is_empty());
        assert!(criteria.matches(&candidate(&[], None, None)));
    }

    #[test]
    fn test_string_predicates_are_case_insensitive() {
        let to = vec!["Bob <BOB@example.com>".to_string()];
        let criteria = FilterCriteria {
            sender: Some("JANE".into()),
            recipient: Some("bob@".into()),
            subject: Some("hell".into()),
            body: Some("QUARTERLY".into()),
            ..FilterCriteria::default()
        };
        assert!(criteria.matches(&candidate(&to, None, None)));

        let miss = FilterCriteria {
            body: Some("invoice".into()),
            ..criteria.clone()
        };
        assert!(!miss.matches(&candidate(&to, None, None)));

        let nobody = FilterCriteria {
            recipient: Some("carol".into()),
            ..criteria
        };
        assert!(!nobody.matches(&candidate(&to, None, None)));
    }

    #[test]
    fn test_date_bounds_are_inclusive() {
        let sent = utc("2024-01-01 10:00:00");
        let criteria = FilterCriteria {
            sent_after: Some(sent),
            sent_before: Some(sent),
            ..FilterCriteria::default()
        };
        assert!(criteria.matches(&candidate(&[], Some(&sent), None)));

        let later = utc("2024-01-01 10:00:01");
        assert!(!criteria.matches(&candidate(&[], Some(&later), None)));
    }

    #[test]
    fn test_missing_instant_never_excludes() {
        let criteria = FilterCriteria {
            received_after: parse_canonical("2030-01-01"),
            received_hours: Some(HourRange::new(1, 2).unwrap()),
            sent_before: parse_canonical("1990-01-01"),
            ..FilterCriteria::default()
        };
        assert!(criteria.matches(&candidate(&[], None, None)));

        let received = utc("2024-01-01 10:00:00");
        assert!(!criteria.matches(&candidate(&[], None, Some(&received))));
    }

    #[test]
    fn test_hour_ranges_apply_per_instant() {
        let sent = utc("2024-01-01 10:00:00"); // 13:00 at UTC+3
        let received = utc("2024-01-01 20:00:00"); // 23:00 at UTC+3
        let criteria = FilterCriteria {
            sent_hours: Some(HourRange::new(8, 17).unwrap()),
            received_hours: Some(HourRange::new(22, 6).unwrap()),
            ..FilterCriteria::default()
        };
        assert!(criteria.matches(&candidate(&[], Some(&sent), Some(&received))));

        let swapped = FilterCriteria {
            sent_hours: criteria.received_hours,
            received_hours: criteria.sent_hours,
            ..FilterCriteria::default()
        };
        assert!(!swapped.matches(&candidate(&[], Some(&sent), Some(&received))));
    }

    #[test]
    fn test_scenario_sender_and_sent_after() {
        let raw = RawCriteria {
            sender: Some("jane".into()),
            sent_after: Some("2024-01-01 00:00:00".into()),
            ..RawCriteria::default()
        };
        let criteria = FilterCriteria::from(raw);
        let sent = utc("2024-01-01 10:00:00");
        assert!(criteria.matches(&candidate(&[], Some(&sent), None)));
    }

    #[test]
    fn test_raw_criteria_drop_invalid_values() {
        let raw = RawCriteria {
            subject: Some(String::new()),
            sent_after: Some("not a date".into()),
            received_before: Some("31.12.2024".into()),
            sent_time: Some("25-3".into()),
            received_time: Some("9-18".into()),
            ..RawCriteria::default()
        };
        let criteria = FilterCriteria::from(raw);
        assert_eq!(criteria.subject, None);
        assert_eq!(criteria.sent_after, None);
        assert_eq!(criteria.received_before, parse_canonical("2024-12-31"));
        assert_eq!(criteria.sent_hours, None);
        assert_eq!(criteria.received_hours, HourRange::new(9, 18).ok());
    }

    proptest! {
        #[test]
        fn test_wrapped_range_is_complement_of_straight_range(
            a in 0u32..24,
            b in 0u32..24,
            hour in 0u32..24,
        ) {
            prop_assume!(a < b);
            let straight = HourRange::new(a, b).unwrap();
            let wrapped = HourRange::new(b, a).unwrap();
            prop_assert_ne!(straight.contains(hour), wrapped.contains(hour));
        }
    }
}
