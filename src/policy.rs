use chrono::{DateTime, Duration, Utc};

/// Cached feeds older than this are treated as unusable.
pub const MAX_CACHE_AGE_DAYS: i64 = 7;

/// Returns true if a cache saved at `timestamp` is still usable at `now`.
/// Fails closed: if the expiry instant cannot be computed, the cache is stale.
pub fn is_fresh(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    match timestamp.checked_add_signed(Duration::days(MAX_CACHE_AGE_DAYS)) {
        Some(max_age) => now < max_age,
        None => false,
    }
}
