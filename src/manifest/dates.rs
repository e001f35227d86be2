//! Manifest date encoding.
//!
//! Current manifests write dates as RFC 1123 strings in GMT. The oldest
//! dialect wrote raw millisecond counts. Newer manifests may also carry one
//! of two macros in place of a date.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::{Error, Result};
use crate::model::DateValue;

/// Macro: take the date from the archive entry's modification time.
pub const MACRO_FILETIME: &str = "${FILETIME}";

/// Macro: take the date from the start of the import.
pub const MACRO_IMPORTTIME: &str = "${IMPORTTIME}";

const RFC1123_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

fn invalid(raw: &str) -> Error {
    Error::InvalidValue {
        field: "date",
        value: raw.to_string(),
    }
}

/// Format milliseconds since the epoch as an RFC 1123 date.
///
/// Out-of-range values (like the "never expires" sentinel) fall back to the
/// raw millisecond count, which [`parse_date`] accepts as well.
#[must_use]
pub fn format_date(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(at) if (0..=9999).contains(&chrono::Datelike::year(&at)) => {
            at.format(RFC1123_FORMAT).to_string()
        }
        _ => millis.to_string(),
    }
}

/// Parse an RFC 1123, RFC 3339 or raw millisecond date.
///
/// # Errors
///
/// Returns [`Error::InvalidValue`] with field `date` if nothing matches.
pub fn parse_date(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc2822(raw) {
        return Ok(at.timestamp_millis());
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(raw, RFC1123_FORMAT) {
        return Ok(at.and_utc().timestamp_millis());
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.timestamp_millis());
    }
    parse_millis(raw)
}

/// Parse a raw millisecond count, as the oldest dialect writes dates.
///
/// # Errors
///
/// Returns [`Error::InvalidValue`] with field `date` if `raw` is not an integer.
pub fn parse_millis(raw: &str) -> Result<i64> {
    raw.trim().parse().map_err(|_| invalid(raw))
}

/// Parse a date that may also be one of the date macros.
///
/// # Errors
///
/// Returns [`Error::InvalidValue`] with field `date` if nothing matches.
pub fn parse_date_value(raw: &str) -> Result<DateValue> {
    match raw.trim() {
        MACRO_FILETIME => Ok(DateValue::FileTime),
        MACRO_IMPORTTIME => Ok(DateValue::ImportTime),
        other => parse_date(other).map(DateValue::At),
    }
}

/// Encode a date value for a manifest.
#[must_use]
pub fn format_date_value(value: DateValue) -> String {
    match value {
        DateValue::At(ms) => format_date(ms),
        DateValue::FileTime => MACRO_FILETIME.to_string(),
        DateValue::ImportTime => MACRO_IMPORTTIME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc1123_round_trip() {
        let millis = 1_725_357_600_000; // Tue, 03 Sep 2024 10:00:00 GMT
        let text = format_date(millis);
        assert_eq!(text, "Tue, 03 Sep 2024 10:00:00 GMT");
        assert_eq!(parse_date(&text).unwrap(), millis);
    }

    #[test]
    fn test_parse_alternatives() {
        assert_eq!(parse_date("2024-09-03T10:00:00Z").unwrap(), 1_725_357_600_000);
        assert_eq!(parse_date("1725357600000").unwrap(), 1_725_357_600_000);
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_sentinels_survive() {
        assert_eq!(parse_date(&format_date(i64::MAX)).unwrap(), i64::MAX);
        assert_eq!(parse_date(&format_date(0)).unwrap(), 0);
    }

    #[test]
    fn test_macros() {
        assert_eq!(parse_date_value("${FILETIME}").unwrap(), DateValue::FileTime);
        assert_eq!(parse_date_value(" ${IMPORTTIME} ").unwrap(), DateValue::ImportTime);
        assert_eq!(format_date_value(DateValue::FileTime), MACRO_FILETIME);
        assert_eq!(parse_date_value("0").unwrap(), DateValue::At(0));
    }
}
