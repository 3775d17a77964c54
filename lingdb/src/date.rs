use chrono::{NaiveDate, NaiveDateTime, Timelike};

/// Parse an ISO 8601 date string (YYYY-MM-DD) into a NaiveDate.
///
/// ```
/// use lingdb::date;
///
/// let date = date::parse_date("2012-01-30").expect("Parse OK");
/// assert_eq!(date.to_string(), "2012-01-30");
///
/// assert!(date::parse_date("2012-01-32").is_err());
/// assert!(date::parse_date("01/30/2012").is_err());
/// ```
pub fn parse_date(date: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .or_else(|e| Err(format!("Could not parse date string: {e} {date}")))
}

/// Parse an ISO 8601 datetime string (YYYY-MM-DDTHH:MM:SS with an
/// optional seconds fraction) into a NaiveDateTime.
///
/// The fraction, when present, is read as a whole microsecond count:
/// "...T09:08:22.5" is 22 seconds and 5 microseconds, not 22.5 seconds.
/// A fraction that does not work as a microsecond count is dropped and
/// the whole-seconds value returned.
///
/// ```
/// use lingdb::date;
/// use chrono::Timelike;
///
/// let dt = date::parse_datetime("2012-01-30T09:08:22").expect("Parse OK");
/// assert_eq!(dt.second(), 22);
///
/// let dt = date::parse_datetime("2012-01-30T09:08:22.5").expect("Parse OK");
/// assert_eq!(dt.nanosecond(), 5_000);
///
/// let dt = date::parse_datetime("2012-01-30T09:08:22.turnip").expect("Parse OK");
/// assert_eq!(dt.nanosecond(), 0);
///
/// assert!(date::parse_datetime("2012-01-30").is_err());
/// assert!(date::parse_datetime("2012-01-30 09:08:22").is_err());
/// ```
pub fn parse_datetime(dt: &str) -> Result<NaiveDateTime, String> {
    let mut parts = dt.split('.');
    let whole = parts.next().unwrap_or(dt);

    let parsed = NaiveDateTime::parse_from_str(whole, "%Y-%m-%dT%H:%M:%S")
        .or_else(|e| Err(format!("Could not parse datetime string: {e} {dt}")))?;

    let micros = match parts.next() {
        Some(frac) => match frac.parse::<u32>() {
            Ok(n) if n < 1_000_000 => n,
            _ => return Ok(parsed),
        },
        None => return Ok(parsed),
    };

    Ok(parsed.with_nanosecond(micros * 1_000).unwrap_or(parsed))
}
