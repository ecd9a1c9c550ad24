use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an upstream timestamp into UTC.
///
/// Accepts RFC 3339 (a trailing `Z` included), the same with a space instead
/// of `T`, naive date-times (read as UTC) and bare `YYYY-MM-DD` dates (midnight
/// UTC). Anything else yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_zulu_and_offsets_normalize_to_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T15:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T10:00:00-05:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 15:00:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T15:00:00"), Some(expected));
    }

    #[test]
    fn test_bare_date_is_midnight_utc() {
        assert_eq!(
            parse_timestamp(" 2024-04-20 "),
            Some(Utc.with_ymd_and_hms(2024, 4, 20, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_garbage_is_none() {
        for raw in ["", "yesterday", "04/20/2024", "2024-13-45"] {
            assert_eq!(parse_timestamp(raw), None, "{raw}");
        }
    }
}
