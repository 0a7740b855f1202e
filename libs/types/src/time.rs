//! Wall-clock helpers
//!
//! All timestamps in the pipeline are Unix nanoseconds as `i64`.

use chrono::Utc;

/// Nanoseconds per second
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Current wall-clock time in Unix nanoseconds
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_nanos_is_recent() {
        // Anything after 2020-01-01 and before 2100-01-01
        let now = now_nanos();
        assert!(now > 1_577_836_800 * NANOS_PER_SEC);
        assert!(now < 4_102_444_800 * NANOS_PER_SEC);
    }
}
