use time::OffsetDateTime;

/// Milliseconds since the Unix epoch.
///
/// Scaling decisions only compare two readings of this clock, so a wall
/// clock step shows up as one skewed load factor and is then re-baselined.
pub fn now_millis() -> u64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    u64::try_from(nanos / 1_000_000).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_is_monotone_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(a > 1_600_000_000_000);
        assert!(b >= a);
    }
}
