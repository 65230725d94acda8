//! Time utilities: duration strings, instants given on the command line.

use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};

/// Parse durations such as `6h`, `45m`, `8h30m` or `90s`.
pub fn parse_duration(s: &str) -> AppResult<Duration> {
    let raw = s.trim();
    if raw.is_empty() {
        return Err(AppError::InvalidDuration(s.to_string()));
    }

    let invalid = || AppError::InvalidDuration(s.to_string());

    let mut total = Duration::zero();
    let mut digits = String::new();
    for c in raw.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: i64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        let part = match c {
            'h' | 'H' => Duration::try_hours(n),
            'm' | 'M' => Duration::try_minutes(n),
            's' | 'S' => Duration::try_seconds(n),
            _ => None,
        }
        .ok_or_else(invalid)?;
        total = total.checked_add(&part).ok_or_else(invalid)?;
    }

    // a bare number is minutes
    if !digits.is_empty() {
        let n: i64 = digits.parse().map_err(|_| invalid())?;
        let part = Duration::try_minutes(n).ok_or_else(invalid)?;
        total = total.checked_add(&part).ok_or_else(invalid)?;
    }

    if total <= Duration::zero() {
        return Err(AppError::InvalidDuration(s.to_string()));
    }
    Ok(total)
}

/// Parse an instant: RFC 3339, or `YYYY-MM-DD HH:MM[:SS]` in local time.
pub fn parse_instant(s: &str) -> AppResult<DateTime<Utc>> {
    let raw = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .ok_or_else(|| AppError::InvalidDate(s.to_string()))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| AppError::InvalidDate(s.to_string()))
}

pub fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}
