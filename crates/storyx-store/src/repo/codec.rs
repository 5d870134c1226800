//! Column encodings shared by the repositories

use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-width RFC 3339 UTC text with nanoseconds; sorts chronologically
pub fn sql_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_time(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sql_time_keeps_nanoseconds() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let text = sql_time(&at);
        assert_eq!(text, "2023-11-14T22:13:20.123456789Z");
        assert_eq!(parse_time(&text).unwrap(), at);
    }

    #[test]
    fn test_sql_time_sorts_as_text() {
        let early = Utc.timestamp_opt(1_700_000_000, 900_000_000).unwrap();
        let late = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
        assert!(sql_time(&early) < sql_time(&late));
    }
}
