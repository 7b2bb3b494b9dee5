use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::error::{ProcessingError, Result};

const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Start of the hour containing `ts`.
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0).unwrap_or(ts)
}

/// Parse an offset string such as `+06:00`, `-0330` or `Z`.
pub fn parse_utc_offset(offset: &str) -> Result<FixedOffset> {
    let trimmed = offset.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0)
            .ok_or_else(|| ProcessingError::InvalidTimestamp(offset.to_string()));
    }

    let (sign, rest) = match trimmed.chars().next() {
        Some('+') => (1, &trimmed[1..]),
        Some('-') => (-1, &trimmed[1..]),
        _ => {
            return Err(ProcessingError::InvalidTimestamp(format!(
                "Invalid UTC offset: '{}'",
                offset
            )))
        }
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok(), Some(0)),
        4 => (digits[..2].parse::<i32>().ok(), digits[2..].parse::<i32>().ok()),
        _ => (None, None),
    };

    match (hours, minutes) {
        (Some(h), Some(m)) if h <= 14 && m < 60 => {
            FixedOffset::east_opt(sign * (h * 3600 + m * 60)).ok_or_else(|| {
                ProcessingError::InvalidTimestamp(format!("Invalid UTC offset: '{}'", offset))
            })
        }
        _ => Err(ProcessingError::InvalidTimestamp(format!(
            "Invalid UTC offset: '{}'",
            offset
        ))),
    }
}

pub fn parse_naive(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| ProcessingError::InvalidTimestamp(value.to_string()))
}

/// Convert a local civil time at a fixed offset to UTC.
pub fn local_to_utc(local: NaiveDateTime, offset: FixedOffset) -> Result<DateTime<Utc>> {
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ProcessingError::InvalidTimestamp(local.to_string()))
}

/// Timestamps carrying an offset are converted to UTC; naive ones are taken as UTC.
pub fn parse_timestamp_utc(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%:z") {
        return Ok(dt.with_timezone(&Utc));
    }
    Ok(parse_naive(trimmed)?.and_utc())
}

/// Local timestamp with an explicit offset fallback. A value that already
/// carries its own offset wins over `default_offset`.
pub fn parse_local_timestamp(value: &str, default_offset: FixedOffset) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    local_to_utc(parse_naive(trimmed)?, default_offset)
}
