use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use crate::utils::errors::{AppError, Result};

/// Parse a `YYYY-MM-DD` calendar day.
pub fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| AppError::Parse(format!("Invalid date '{}': {}", value, e)))
}

/// Parse a UTC instant written as `YYYY-MM-DD HH:MM:SS` (a `T` separator is also accepted).
pub fn parse_instant(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|e| AppError::Parse(format!("Invalid timestamp '{}': {}", value, e)))
}

/// First and last second of a UTC day, as unix timestamps.
pub fn day_bounds(date: NaiveDate) -> (i64, i64) {
    let start = date.and_time(NaiveTime::MIN).and_utc().timestamp();
    (start, start + 86_399)
}

/// Formats a unix timestamp the way the RIPEstat API expects it.
pub fn api_timestamp(ts: i64) -> String {
    match chrono::DateTime::from_timestamp(ts, 0) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

/// Every date from `from` to `to`, inclusive. Empty when `from > to`.
pub fn days_inclusive(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let mut next = if from <= to { Some(from) } else { None };
    std::iter::from_fn(move || {
        let current = next?;
        next = if current < to { current.checked_add_days(Days::new(1)) } else { None };
        Some(current)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_bounds_cover_the_whole_utc_day() {
        let day = parse_day("2025-06-13").unwrap();
        let (start, end) = day_bounds(day);
        assert_eq!(start, 1_749_772_800);
        assert_eq!(end - start, 86_399);
        assert_eq!(api_timestamp(end), "2025-06-13T23:59:59");
    }

    #[test]
    fn instants_accept_space_or_t_separator() {
        let a = parse_instant("2025-06-13 15:00:00").unwrap();
        let b = parse_instant("2025-06-13T15:00:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_instant("13/06/2025 15:00").is_err());
    }

    #[test]
    fn day_iteration_crosses_month_end() {
        let days: Vec<String> = days_inclusive(parse_day("2025-09-29").unwrap(), parse_day("2025-10-02").unwrap())
            .map(|d| d.to_string())
            .collect();
        assert_eq!(days, vec!["2025-09-29", "2025-09-30", "2025-10-01", "2025-10-02"]);
    }

    #[test]
    fn reversed_range_is_empty() {
        let from = parse_day("2025-09-30").unwrap();
        let to = parse_day("2025-09-01").unwrap();
        assert_eq!(days_inclusive(from, to).count(), 0);
        assert_eq!(days_inclusive(to, to).count(), 1);
    }
}
