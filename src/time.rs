//! Canonical-offset instants.
//!
//! Every displayed or compared instant is expressed at UTC+3. Store instants
//! without an offset are taken to be UTC; user-supplied dates are taken to be
//! already at UTC+3.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

/// Offset of the canonical timezone, in seconds east of UTC.
pub const CANONICAL_OFFSET_SECS: i32 = 3 * 3600;

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S (GMT+3)";
const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M";

/// Rendered in place of an absent instant.
pub const UNKNOWN_INSTANT: &str = "Неизвестно";

const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%d.%m.%Y %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y"];

#[must_use]
pub fn canonical_offset() -> FixedOffset {
    FixedOffset::east_opt(CANONICAL_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// An instant as a store reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// No offset recorded; interpreted as UTC.
    Naive(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

impl Timestamp {
    #[must_use]
    pub fn to_canonical(self) -> DateTime<FixedOffset> {
        match self {
            Self::Naive(naive) => Utc.from_utc_datetime(&naive).with_timezone(&canonical_offset()),
            Self::Zoned(zoned) => zoned.with_timezone(&canonical_offset()),
        }
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(naive: NaiveDateTime) -> Self {
        Self::Naive(naive)
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(zoned: DateTime<FixedOffset>) -> Self {
        Self::Zoned(zoned)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(utc: DateTime<Utc>) -> Self {
        Self::Zoned(utc.with_timezone(&Utc.fix()))
    }
}

/// Re-expresses an aware instant at the canonical offset.
#[must_use]
pub fn to_canonical<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateTime<FixedOffset> {
    instant.with_timezone(&canonical_offset())
}

#[must_use]
pub fn now_canonical() -> DateTime<FixedOffset> {
    to_canonical(&Utc::now())
}

/// `2024-01-01 13:00:00 (GMT+3)`, or [`UNKNOWN_INSTANT`].
#[must_use]
pub fn format_instant(instant: Option<&DateTime<FixedOffset>>) -> String {
    instant.map_or_else(
        || UNKNOWN_INSTANT.to_string(),
        |at| to_canonical(at).format(DISPLAY_FORMAT).to_string(),
    )
}

/// `20240101_1300`, used as the leading part of export file names.
#[must_use]
pub fn file_stamp(instant: &DateTime<FixedOffset>) -> String {
    to_canonical(instant).format(FILE_STAMP_FORMAT).to_string()
}

/// Parses a command-line date at the canonical offset.
///
/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD`, `DD.MM.YYYY` and
/// `DD.MM.YYYY HH:MM:SS`; date-only input means midnight.
#[must_use]
pub fn parse_canonical(input: &str) -> Option<DateTime<FixedOffset>> {
    let input = input.trim();
    let naive = DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    canonical_offset().from_local_datetime(&naive).single()
}
