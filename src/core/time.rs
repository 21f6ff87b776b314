use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub fn format_offset(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

/// Whole seconds between two instants, floored at zero.
pub fn elapsed_seconds(from: OffsetDateTime, to: OffsetDateTime) -> u64 {
    let seconds = (to - from).whole_seconds();
    if seconds > 0 {
        seconds as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn format_offset_preserves_offset() {
        let value = datetime!(2025-01-02 13:20:30 +03:00);
        assert_eq!(format_offset(value), "2025-01-02T13:20:30+03:00");
    }

    #[test]
    fn elapsed_seconds_floors_negative_spans() {
        let start = datetime!(2025-01-02 10:00:00 UTC);
        let end = datetime!(2025-01-02 10:01:30.700 UTC);
        assert_eq!(elapsed_seconds(start, end), 90);
        assert_eq!(elapsed_seconds(end, start), 0);
    }
}
