//! General time utility functions

use chrono;
use std::time::{Duration, Instant};

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    if let Some(ns) = duration.num_nanoseconds() {
        Some(ns as f64 / NANOS_PER_SECOND as f64)
    }
    else {
        None
    }
}

/// Time elapsed between `earlier` and `now`, saturating at zero if `earlier`
/// is in the future.
pub fn age(now: Instant, earlier: Instant) -> Duration {
    now.checked_duration_since(earlier).unwrap_or_default()
}

/// Age of an optional timestamp, `None` meaning "never", which is treated as
/// infinitely old.
pub fn age_or_max(now: Instant, earlier: Option<Instant>) -> Duration {
    match earlier {
        Some(t) => age(now, t),
        None => Duration::MAX
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_age_saturates() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(10);

        assert_eq!(age(t1, t0), Duration::from_millis(10));
        assert_eq!(age(t0, t1), Duration::from_millis(0));
        assert_eq!(age_or_max(t0, None), Duration::MAX);
    }
}
