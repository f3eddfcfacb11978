//! W3C-Datetime conversion between epoch-second floats and `lastmod` strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::error::ModelError;

/// Formats an epoch-seconds timestamp as a W3C-Datetime string in UTC.
///
/// Whole-second timestamps render without a fraction
/// (`2013-01-03T09:00:00Z`); fractional timestamps carry microsecond
/// precision, matching what [`parse_w3c`] reads back losslessly at the
/// one-second tolerance used by sync comparisons.
#[must_use]
pub fn format_w3c(timestamp: f64) -> String {
    let mut secs = timestamp.floor() as i64;
    let mut nanos = ((timestamp - secs as f64) * 1e9).round() as u32;
    if nanos >= 1_000_000_000 {
        secs += 1;
        nanos = 0;
    }
    let datetime =
        DateTime::<Utc>::from_timestamp(secs, nanos).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    if nanos == 0 {
        datetime.to_rfc3339_opts(SecondsFormat::Secs, true)
    } else {
        datetime.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// Parses a W3C-Datetime string into epoch seconds.
///
/// Accepted profiles: `YYYY`, `YYYY-MM`, `YYYY-MM-DD` (midnight UTC) and the
/// full datetime forms with a `Z` or numeric offset designator, with or
/// without fractional seconds. Anything else is a [`ModelError::InvalidDatetime`].
pub fn parse_w3c(value: &str) -> Result<f64, ModelError> {
    let value = value.trim();
    let invalid = || ModelError::InvalidDatetime(value.to_string());

    let date_only = match value.len() {
        4 => value
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1)),
        7 => NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").ok(),
        10 => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
        _ => None,
    };
    if let Some(date) = date_only {
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        return Ok(midnight.and_utc().timestamp() as f64);
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(to_epoch(&datetime.with_timezone(&Utc)));
    }

    // Minutes-precision form (`2013-01-03T09:00Z`) allowed by the W3C profile
    // but rejected by strict RFC 3339 parsers.
    let normalized = value.strip_suffix('Z').map(|head| format!("{head}+00:00"));
    let minutes = normalized.as_deref().unwrap_or(value);
    DateTime::parse_from_str(minutes, "%Y-%m-%dT%H:%M%:z")
        .map(|datetime| to_epoch(&datetime.with_timezone(&Utc)))
        .map_err(|_| invalid())
}

fn to_epoch(datetime: &DateTime<Utc>) -> f64 {
    datetime.timestamp() as f64 + f64::from(datetime.timestamp_subsec_nanos()) / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_seconds_without_fraction() {
        assert_eq!(format_w3c(1_357_203_600.0), "2013-01-03T09:00:00Z");
    }

    #[test]
    fn formats_fractional_seconds_with_micros() {
        assert_eq!(format_w3c(1_357_203_600.5), "2013-01-03T09:00:00.500000Z");
    }

    #[test]
    fn parses_full_datetime_with_zulu() {
        assert_eq!(parse_w3c("2013-01-03T09:00:00Z").unwrap(), 1_357_203_600.0);
    }

    #[test]
    fn parses_datetime_with_offset() {
        assert_eq!(
            parse_w3c("2013-01-03T10:00:00+01:00").unwrap(),
            1_357_203_600.0
        );
    }

    #[test]
    fn parses_date_only_profiles() {
        assert_eq!(parse_w3c("1970-01-01").unwrap(), 0.0);
        assert_eq!(parse_w3c("1970-01").unwrap(), 0.0);
        assert_eq!(parse_w3c("1970").unwrap(), 0.0);
    }

    #[test]
    fn parses_minutes_precision_form() {
        assert_eq!(parse_w3c("2013-01-03T09:00Z").unwrap(), 1_357_203_600.0);
    }

    #[test]
    fn round_trips_through_format() {
        for timestamp in [0.0, 1_357_203_600.0, 1_718_000_000.25] {
            let rendered = format_w3c(timestamp);
            assert!((parse_w3c(&rendered).unwrap() - timestamp).abs() < 1e-6);
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_w3c("yesterday"),
            Err(ModelError::InvalidDatetime(_))
        ));
        assert!(parse_w3c("2013-13-03").is_err());
        assert!(parse_w3c("").is_err());
    }
}
