//! Scalar converters for provider values that arrive as loosely formatted strings.

use chrono::{Duration, NaiveDate};
use serde_json::Value;

use crate::error::{EtlError, Result};

/// "MM:SS" game clock to fractional minutes. Integers pass through and empty values read as 0.
pub fn minutes_from_clock(value: &Value) -> Result<f64> {
    match value {
        Value::Null => Ok(0.0),
        Value::Number(n) => Ok(n.as_f64().unwrap_or_default()),
        Value::String(s) if s.trim().is_empty() => Ok(0.0),
        Value::String(s) => {
            let Some((minutes, seconds)) = s.trim().split_once(':') else {
                return s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| EtlError::payload(format!("bad minutes value {s:?}")));
            };
            let minutes: i64 = minutes
                .parse()
                .map_err(|_| EtlError::payload(format!("bad minutes value {s:?}")))?;
            let seconds: i64 = seconds
                .parse()
                .map_err(|_| EtlError::payload(format!("bad seconds value {s:?}")))?;
            Ok(minutes as f64 + seconds as f64 / 60.0)
        }
        other => Err(EtlError::payload(format!("bad minutes value {other}"))),
    }
}

/// "6-8" to 80 inches; empty reads as 0.
pub fn height_inches(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    let (feet, inches) = raw
        .split_once('-')
        .ok_or_else(|| EtlError::payload(format!("bad height {raw:?}")))?;
    let feet: i64 = feet
        .parse()
        .map_err(|_| EtlError::payload(format!("bad height {raw:?}")))?;
    let inches: i64 = inches
        .parse()
        .map_err(|_| EtlError::payload(format!("bad height {raw:?}")))?;
    Ok(feet * 12 + inches)
}

pub fn salary_to_int(raw: &str) -> Result<i64> {
    let digits: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
    digits
        .trim()
        .parse()
        .map_err(|_| EtlError::payload(format!("bad salary {raw:?}")))
}

/// "H:MM" game duration. The provider occasionally reports "1:60", which is kept as 2 hours.
pub fn duration_from_clock(raw: &str) -> Result<Option<Duration>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let (hours, minutes) = raw
        .split_once(':')
        .ok_or_else(|| EtlError::payload(format!("bad duration {raw:?}")))?;
    let hours: i64 = hours
        .parse()
        .map_err(|_| EtlError::payload(format!("bad duration {raw:?}")))?;
    let minutes: i64 = minutes
        .parse()
        .map_err(|_| EtlError::payload(format!("bad duration {raw:?}")))?;
    Ok(Some(Duration::hours(hours) + Duration::minutes(minutes)))
}

/// Provider timestamps look like "2016-10-25T00:00:00"; only the date part is meaningful.
pub fn parse_provider_date(raw: &str) -> Result<NaiveDate> {
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .map_err(|_| EtlError::payload(format!("bad provider date {raw:?}")))
}
