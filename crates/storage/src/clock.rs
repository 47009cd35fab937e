//! Wall-clock helpers. Every timestamp in cirrus records is epoch milliseconds.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Render epoch milliseconds as RFC 3339, `None` if out of range.
pub fn to_rfc3339(millis: i64) -> Option<String> {
    let nanos = i128::from(millis) * 1_000_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()?
        .format(&Rfc3339)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_rfc3339(raw: &str) -> Option<i64> {
        let dt = OffsetDateTime::parse(raw, &Rfc3339).ok()?;
        Some((dt.unix_timestamp_nanos() / 1_000_000) as i64)
    }

    #[test]
    fn rfc3339_round_trip() {
        let rendered = to_rfc3339(1_600_000_000_123).unwrap();
        assert_eq!(rendered, "2020-09-13T12:26:40.123Z");
        assert_eq!(from_rfc3339(&rendered), Some(1_600_000_000_123));
    }

    #[test]
    fn out_of_range_millis_do_not_render() {
        assert_eq!(to_rfc3339(i64::MAX), None);
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
