//! Ledger time handling
//!
//! Partition keys and rendered timestamps are always computed in one fixed
//! offset so that a record lands in the same month partition no matter
//! which host clock zone the recorder runs under.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// Asia/Tokyo has no DST, so a fixed +09:00 offset is exact
pub const TOKYO_OFFSET_SECS: i32 = 9 * 3600;

/// Format of the timestamp column
pub const LEDGER_TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Format of monthly partition names
pub const PARTITION_KEY_FORMAT: &str = "%Y-%m";

/// The default ledger zone (UTC+09:00)
pub fn tokyo() -> FixedOffset {
    FixedOffset::east_opt(TOKYO_OFFSET_SECS).expect("+09:00 is within the valid offset range")
}

/// Build an offset from seconds east of UTC, `None` when out of range
pub fn offset_from_secs(secs: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(secs)
}

/// Monthly partition name (`YYYY-MM`) of `ts` in `zone`
pub fn partition_key(ts: &DateTime<Utc>, zone: &FixedOffset) -> String {
    ts.with_timezone(zone).format(PARTITION_KEY_FORMAT).to_string()
}

/// Whether `name` is a monthly partition name as produced by [`partition_key`]
pub fn is_partition_key(name: &str) -> bool {
    NaiveDate::parse_from_str(&format!("{}-01", name), "%Y-%m-%d")
        .map(|date| date.format(PARTITION_KEY_FORMAT).to_string() == name)
        .unwrap_or(false)
}

/// Render `ts` as `YYYY/MM/DD HH:mm:ss` in `zone`
pub fn format_timestamp(ts: &DateTime<Utc>, zone: &FixedOffset) -> String {
    ts.with_timezone(zone).format(LEDGER_TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_partition_key_uses_ledger_zone() {
        // 2024-04-30 15:30 UTC is already May 1st in Tokyo
        let ts = Utc.with_ymd_and_hms(2024, 4, 30, 15, 30, 0).unwrap();
        assert_eq!(partition_key(&ts, &tokyo()), "2024-05");
        assert_eq!(partition_key(&ts, &offset_from_secs(0).unwrap()), "2024-04");
    }

    #[test]
    fn test_is_partition_key() {
        assert!(is_partition_key("2024-05"));
        assert!(is_partition_key("1999-12"));
        assert!(!is_partition_key("2024-13"));
        assert!(!is_partition_key("2024-5"));
        assert!(!is_partition_key("Users"));
        assert!(!is_partition_key("2024-05-01"));
    }

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 5, 9).unwrap();
        assert_eq!(format_timestamp(&ts, &tokyo()), "2024/05/01 09:05:09");
    }

    #[test]
    fn test_offset_bounds() {
        assert!(offset_from_secs(TOKYO_OFFSET_SECS).is_some());
        assert!(offset_from_secs(90_000).is_none());
    }
}
