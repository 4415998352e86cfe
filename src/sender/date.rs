//! Date normalization to canonical RFC 3339 text.
//!
//! Integer epochs of any magnitude are padded or truncated to 16 decimal
//! digits and read as microseconds, which maps second, millisecond,
//! microsecond and nanosecond timestamps of the current era onto the same
//! instant. Text without an offset is read as UTC.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Timelike, Utc};
use serde_json::Value;

use super::error::EncodeError;

/// Decimal digits of a microsecond epoch in the current era.
const EPOCH_DIGITS: usize = 16;

const NAIVE_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const OFFSET_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S%.f%#z",
    "%Y/%m/%d %H:%M:%S%.f %#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f %#z",
];

/// Current instant in canonical form.
#[must_use]
pub fn now() -> String {
    let now = Utc::now();
    let micros = now.timestamp_micros();
    format_canonical(&from_micros(micros).unwrap_or_else(|| now.fixed_offset()))
}

/// Normalize an epoch number or timestamp text.
///
/// # Errors
///
/// Returns `EncodeError::InvalidDate` for floats, negative epochs, other
/// value kinds and unrecognized text.
pub fn convert_date(value: &Value) -> Result<String, EncodeError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(epoch_to_micros)
            .and_then(from_micros)
            .map(|dt| format_canonical(&dt))
            .ok_or_else(|| EncodeError::InvalidDate(n.to_string())),
        Value::String(s) => parse_text(s)
            .map(|dt| format_canonical(&dt))
            .ok_or_else(|| EncodeError::InvalidDate(s.clone())),
        other => Err(EncodeError::InvalidDate(other.to_string())),
    }
}

fn epoch_to_micros(epoch: u64) -> Option<i64> {
    let mut digits = epoch.to_string();
    if digits.len() < EPOCH_DIGITS {
        digits.extend(std::iter::repeat('0').take(EPOCH_DIGITS - digits.len()));
    } else {
        digits.truncate(EPOCH_DIGITS);
    }
    digits.parse().ok()
}

fn from_micros(micros: i64) -> Option<DateTime<FixedOffset>> {
    DateTime::<Utc>::from_timestamp_micros(micros).map(|dt| dt.fixed_offset())
}

fn parse_text(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NAIVE_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(text, format)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
    })
}

/// Render with nanosecond precision, trailing fractional zeros trimmed and
/// `Z` for a zero offset.
#[must_use]
pub fn format_canonical(dt: &DateTime<FixedOffset>) -> String {
    let mut out = dt.format("%Y-%m-%dT%H:%M:%S").to_string();

    let nanos = dt.nanosecond() % 1_000_000_000;
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }

    if dt.offset().local_minus_utc() == 0 {
        out.push('Z');
    } else {
        out.push_str(&dt.format("%:z").to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn convert(value: Value) -> String {
        convert_date(&value).unwrap()
    }

    #[test]
    fn test_epoch_magnitudes_map_to_same_instant() {
        assert_eq!(convert(json!(1_700_000_000u64)), "2023-11-14T22:13:20Z");
        assert_eq!(convert(json!(1_700_000_000_123u64)), "2023-11-14T22:13:20.123Z");
        assert_eq!(
            convert(json!(1_700_000_000_123_456u64)),
            "2023-11-14T22:13:20.123456Z"
        );
        assert_eq!(
            convert(json!(1_700_000_000_123_456_789u64)),
            "2023-11-14T22:13:20.123456Z"
        );
    }

    #[test]
    fn test_epoch_with_extra_digit_is_truncated() {
        assert_eq!(
            convert(json!(14_773_736_325_048_765u64)),
            "2016-10-25T05:33:52.504876Z"
        );
        assert_eq!(
            convert(json!(14_774_559_431_867_215u64)),
            "2016-10-26T04:25:43.186721Z"
        );
    }

    #[test]
    fn test_supported_text_formats() {
        let cases = [
            ("2017/03/28 15:41:53", "2017-03-28T15:41:53Z"),
            ("2017/03/28 15:41:53.123456", "2017-03-28T15:41:53.123456Z"),
            ("2017-03-28 02:31:55.091", "2017-03-28T02:31:55.091Z"),
            ("2017-03-28 02:31:55", "2017-03-28T02:31:55Z"),
            ("2017-04-05T18:15:01+08:00", "2017-04-05T18:15:01+08:00"),
            ("2016/11/01 12:00:00.123456+08:00", "2016-11-01T12:00:00.123456+08:00"),
            ("2016/11/01 12:00:00 +0800", "2016-11-01T12:00:00+08:00"),
        ];
        for (input, expected) in cases {
            assert_eq!(convert(json!(input)), expected, "input {input}");
        }
    }

    #[test]
    fn test_canonical_text_is_idempotent() {
        for canonical in [
            "2016-10-25T05:33:52.504876Z",
            "2017-04-05T18:15:01+08:00",
            "2023-11-14T22:13:20.1Z",
            "2023-11-14T22:13:20.123456789-05:30",
        ] {
            assert_eq!(convert(json!(canonical)), canonical);
        }
    }

    #[test]
    fn test_format_canonical_trims_fraction() {
        let whole = DateTime::parse_from_rfc3339("2016-10-25T05:33:52Z").unwrap();
        assert_eq!(format_canonical(&whole), "2016-10-25T05:33:52Z");

        let tenths = DateTime::parse_from_rfc3339("2016-10-25T05:33:52.500000000+02:00").unwrap();
        assert_eq!(format_canonical(&tenths), "2016-10-25T05:33:52.5+02:00");

        let nanos = DateTime::parse_from_rfc3339("2016-10-25T05:33:52.000000001Z").unwrap();
        assert_eq!(format_canonical(&nanos), "2016-10-25T05:33:52.000000001Z");
    }

    #[test]
    fn test_now_round_trips() {
        let now = now();
        assert_eq!(convert(json!(now.clone())), now);
    }

    #[test]
    fn test_invalid_dates() {
        for bad in [json!(1.5), json!(-10), json!("yesterday"), json!(true), json!(null)] {
            assert!(matches!(convert_date(&bad), Err(EncodeError::InvalidDate(_))));
        }
    }
}
