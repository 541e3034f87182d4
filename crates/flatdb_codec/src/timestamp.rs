//! Wall-clock timestamps with millisecond precision.

use crate::error::{CodecError, CodecResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::cmp::Ordering;
use std::fmt;

/// How a [`Timestamp`] relates to a time zone.
///
/// Mirrors the `kind` byte in the 10-byte wire layout. The kind does not
/// participate in ordering; two timestamps with the same wall-clock value
/// and different kinds compare equal numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TimeKind {
    /// No time-zone affinity recorded.
    #[default]
    Unspecified = 0,
    /// The value is UTC.
    Utc = 1,
    /// The value is in the machine's local zone.
    Local = 2,
}

impl TimeKind {
    /// Looks up a kind from its wire byte.
    ///
    /// # Errors
    ///
    /// Returns an error for bytes other than 0, 1, 2.
    pub fn from_byte(b: u8) -> CodecResult<Self> {
        match b {
            0 => Ok(Self::Unspecified),
            1 => Ok(Self::Utc),
            2 => Ok(Self::Local),
            other => Err(CodecError::ValueOutOfRange(format!(
                "invalid DateTime kind byte {other}"
            ))),
        }
    }

    /// Returns the wire byte for this kind.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A wall-clock date and time with millisecond precision.
///
/// Sub-millisecond precision is truncated at construction so that values
/// survive an encode/decode round trip exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    stamp: NaiveDateTime,
    kind: TimeKind,
}

impl Timestamp {
    /// Creates a timestamp from a chrono datetime, truncating to whole
    /// milliseconds.
    #[must_use]
    pub fn new(stamp: NaiveDateTime, kind: TimeKind) -> Self {
        let millis = stamp.and_utc().timestamp_subsec_millis();
        let truncated = stamp
            .with_nanosecond(millis * 1_000_000)
            .unwrap_or(stamp);
        Self {
            stamp: truncated,
            kind,
        }
    }

    /// Creates a timestamp from calendar and clock components.
    ///
    /// # Errors
    ///
    /// Returns an error if the components do not form a valid date or time.
    pub fn from_components(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        millisecond: u32,
        kind: TimeKind,
    ) -> CodecResult<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            CodecError::ValueOutOfRange(format!("invalid date {year:04}-{month:02}-{day:02}"))
        })?;
        let stamp = date
            .and_hms_milli_opt(hour, minute, second, millisecond)
            .ok_or_else(|| {
                CodecError::ValueOutOfRange(format!(
                    "invalid time {hour:02}:{minute:02}:{second:02}.{millisecond:03}"
                ))
            })?;
        Ok(Self { stamp, kind })
    }

    /// The current time in UTC.
    #[must_use]
    pub fn now_utc() -> Self {
        Self::new(Utc::now().naive_utc(), TimeKind::Utc)
    }

    /// The underlying chrono value.
    #[must_use]
    pub fn as_naive(&self) -> NaiveDateTime {
        self.stamp
    }

    /// The time-zone kind.
    #[must_use]
    pub fn kind(&self) -> TimeKind {
        self.kind
    }

    /// The calendar year.
    ///
    /// # Errors
    ///
    /// Returns an error if the year does not fit the wire format's `i16`.
    pub fn year_i16(&self) -> CodecResult<i16> {
        i16::try_from(self.stamp.year()).map_err(|_| {
            CodecError::ValueOutOfRange(format!(
                "year {} does not fit the DateTime wire format",
                self.stamp.year()
            ))
        })
    }

    /// Month (1-12).
    #[must_use]
    pub fn month(&self) -> u8 {
        self.stamp.month() as u8
    }

    /// Day of month (1-31).
    #[must_use]
    pub fn day(&self) -> u8 {
        self.stamp.day() as u8
    }

    /// Hour (0-23).
    #[must_use]
    pub fn hour(&self) -> u8 {
        self.stamp.hour() as u8
    }

    /// Minute (0-59).
    #[must_use]
    pub fn minute(&self) -> u8 {
        self.stamp.minute() as u8
    }

    /// Second (0-59).
    #[must_use]
    pub fn second(&self) -> u8 {
        self.stamp.second() as u8
    }

    /// Millisecond (0-999).
    #[must_use]
    pub fn millisecond(&self) -> u16 {
        (self.stamp.nanosecond() / 1_000_000) as u16
    }

    /// Ordering on the wall-clock value alone; `kind` is ignored.
    #[must_use]
    pub fn cmp_instant(&self, other: &Self) -> Ordering {
        self.stamp.cmp(&other.stamp)
    }

    /// Parses `YYYY-MM-DD HH:MM:SS[.mmm]` or `YYYY-MM-DDTHH:MM:SS[.mmm]`,
    /// or a bare `YYYY-MM-DD` date.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if no format matches.
    pub fn parse(s: &str) -> CodecResult<Self> {
        let trimmed = s.trim();
        for format in [
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M:%S",
        ] {
            if let Ok(stamp) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(Self::new(stamp, TimeKind::Unspecified));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            if let Some(stamp) = date.and_hms_opt(0, 0, 0) {
                return Ok(Self::new(stamp, TimeKind::Unspecified));
            }
        }
        Err(CodecError::cannot_convert(
            "String",
            "DateTime",
            format!("cannot parse {trimmed:?}"),
        ))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stamp.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_roundtrip() {
        let ts = Timestamp::from_components(2024, 3, 15, 10, 30, 45, 250, TimeKind::Utc).unwrap();
        assert_eq!(ts.year_i16().unwrap(), 2024);
        assert_eq!(ts.month(), 3);
        assert_eq!(ts.day(), 15);
        assert_eq!(ts.hour(), 10);
        assert_eq!(ts.minute(), 30);
        assert_eq!(ts.second(), 45);
        assert_eq!(ts.millisecond(), 250);
        assert_eq!(ts.kind(), TimeKind::Utc);
    }

    #[test]
    fn invalid_components_rejected() {
        assert!(Timestamp::from_components(2024, 13, 1, 0, 0, 0, 0, TimeKind::Unspecified).is_err());
        assert!(Timestamp::from_components(2024, 2, 30, 0, 0, 0, 0, TimeKind::Unspecified).is_err());
        assert!(Timestamp::from_components(2024, 1, 1, 25, 0, 0, 0, TimeKind::Unspecified).is_err());
    }

    #[test]
    fn submillisecond_truncated() {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_nano_opt(0, 0, 0, 123_456_789)
            .unwrap();
        let ts = Timestamp::new(base, TimeKind::Unspecified);
        assert_eq!(ts.millisecond(), 123);
        assert_eq!(ts.as_naive().nanosecond(), 123_000_000);
    }

    #[test]
    fn kind_byte_roundtrip() {
        for kind in [TimeKind::Unspecified, TimeKind::Utc, TimeKind::Local] {
            assert_eq!(TimeKind::from_byte(kind.as_byte()).unwrap(), kind);
        }
        assert!(TimeKind::from_byte(3).is_err());
    }

    #[test]
    fn ordering_ignores_kind() {
        let a = Timestamp::from_components(2024, 1, 1, 0, 0, 0, 0, TimeKind::Utc).unwrap();
        let b = Timestamp::from_components(2024, 1, 1, 0, 0, 0, 0, TimeKind::Local).unwrap();
        assert_eq!(a.cmp_instant(&b), Ordering::Equal);

        let later = Timestamp::from_components(2024, 1, 2, 0, 0, 0, 0, TimeKind::Utc).unwrap();
        assert_eq!(a.cmp_instant(&later), Ordering::Less);
    }

    #[test]
    fn parse_formats() {
        let full = Timestamp::parse("2024-03-15 10:30:45.250").unwrap();
        assert_eq!(full.millisecond(), 250);

        let iso = Timestamp::parse("2024-03-15T10:30:45").unwrap();
        assert_eq!(iso.hour(), 10);

        let date_only = Timestamp::parse("2024-03-15").unwrap();
        assert_eq!(date_only.hour(), 0);

        assert!(Timestamp::parse("not a date").is_err());
    }
}
