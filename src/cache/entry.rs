//! Per-key cache record with freshness and retry-backoff state.

use crate::error::Error;
use crate::types::TimedValue;

/// One cached key with its value, access tracking and backoff state.
///
/// Owned exclusively by the worker holding the key's shard; nothing here is
/// synchronized.
#[derive(Debug)]
pub(crate) struct CacheEntry<K, V> {
    /// Immutable identity.
    pub(crate) key: K,

    value: Option<TimedValue<V>>,

    /// Timestamp of the last client-visible read. Housekeeping sweeps read
    /// this field directly and never update it.
    last_access_at: u64,

    /// Timestamp of the last triggered refresh attempt.
    last_attempt_at: u64,

    /// Current refresh-suppression window in milliseconds.
    backoff_ms: u64,

    /// Whether a refresh for this key is currently in flight.
    in_flight: bool,

    /// Last transient failure, kept so that requests suppressed by backoff
    /// on a value-less entry can surface it instead of hanging.
    last_error: Option<Error>,
}

impl<K, V> CacheEntry<K, V> {
    /// Create an empty entry. `min_backoff_ms` seeds the suppression window.
    pub(crate) fn new(key: K, now: u64, min_backoff_ms: u64) -> Self {
        Self {
            key,
            value: None,
            last_access_at: now,
            last_attempt_at: 0,
            backoff_ms: min_backoff_ms,
            in_flight: false,
            last_error: None,
        }
    }

    /// The cached value without touching the access time. Housekeeping and
    /// internal reads go through here.
    pub(crate) fn value(&self) -> Option<&TimedValue<V>> {
        self.value.as_ref()
    }

    /// The cached value as a client-visible read: updates `last_access_at`.
    pub(crate) fn value_and_touch(&mut self, now: u64) -> Option<&TimedValue<V>> {
        if self.value.is_some() {
            self.last_access_at = now;
        }
        self.value.as_ref()
    }

    /// Whether the entry is stale at `now`. An entry without a value counts
    /// as expired.
    pub(crate) fn is_expired(&self, now: u64) -> bool {
        match &self.value {
            Some(tv) => tv.is_expired(now),
            None => true,
        }
    }

    /// Whether a triggered refresh is still suppressing new attempts.
    pub(crate) fn backoff_active(&self, now: u64) -> bool {
        now < self.last_attempt_at + self.backoff_ms
    }

    /// Record a triggered refresh attempt: advance the attempt timestamp and
    /// double the suppression window up to `max_backoff_ms`.
    ///
    /// This advances on every triggered attempt, not only on failures, which
    /// throttles the rate of upstream calls during sustained staleness.
    pub(crate) fn arm_backoff(&mut self, now: u64, max_backoff_ms: u64) {
        self.last_attempt_at = now;
        self.backoff_ms = (self.backoff_ms.saturating_mul(2)).min(max_backoff_ms);
        self.in_flight = true;
    }

    /// Apply a fetched result under the monotonic-freshness rule: the result
    /// is stored only if its expiry is strictly newer than the current one.
    /// Returns whether it was applied. An applied result resets the backoff
    /// window to `min_backoff_ms` and clears the last error.
    pub(crate) fn apply(&mut self, timed: TimedValue<V>, min_backoff_ms: u64) -> bool {
        let current = self.value.as_ref().map(|tv| tv.expires_at).unwrap_or(0);
        if timed.expires_at <= current {
            return false;
        }
        self.value = Some(timed);
        self.backoff_ms = min_backoff_ms;
        self.last_error = None;
        true
    }

    /// Force the value's expiry into the past without clearing it.
    pub(crate) fn mark_dirty(&mut self) {
        if let Some(tv) = &mut self.value {
            tv.expires_at = 0;
        }
    }

    /// Whether the entry has been idle past `idle_ms` since the last
    /// client-visible read. Does not count as an access.
    pub(crate) fn idle_expired(&self, now: u64, idle_ms: u64) -> bool {
        now > self.last_access_at + idle_ms
    }

    /// Whether the expired entry is flagged for outright removal.
    pub(crate) fn remove_on_expired(&self) -> bool {
        self.value.as_ref().map(|tv| tv.remove_on_expired).unwrap_or(false)
    }

    pub(crate) fn refresh_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Record the outcome of an in-flight refresh that did not produce data.
    pub(crate) fn refresh_settled(&mut self, error: Option<Error>) {
        self.in_flight = false;
        if let Some(e) = error {
            self.last_error = Some(e);
        }
    }

    /// The failure a backoff-suppressed, value-less read should surface.
    pub(crate) fn suppressed_error(&self) -> Error {
        self.last_error.clone().unwrap_or(Error::Backoff)
    }

    #[cfg(test)]
    pub(crate) fn last_access_at(&self) -> u64 {
        self.last_access_at
    }

    #[cfg(test)]
    pub(crate) fn backoff_ms(&self) -> u64 {
        self.backoff_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: u64 = 3_000;
    const MAX: u64 = 60_000;

    fn entry() -> CacheEntry<String, String> {
        CacheEntry::new("k".to_string(), 1_000, MIN)
    }

    #[test]
    fn test_empty_entry_is_expired() {
        let e = entry();
        assert!(e.is_expired(1_000));
        assert!(!e.backoff_active(1_000));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut e = entry();
        assert_eq!(e.backoff_ms(), MIN);

        e.arm_backoff(1_000, MAX);
        assert_eq!(e.backoff_ms(), MIN * 2);
        assert!(e.backoff_active(1_000 + MIN * 2 - 1));
        assert!(!e.backoff_active(1_000 + MIN * 2));

        for i in 0..10 {
            e.arm_backoff(2_000 + i, MAX);
        }
        assert_eq!(e.backoff_ms(), MAX);
    }

    #[test]
    fn test_apply_resets_backoff() {
        let mut e = entry();
        e.arm_backoff(1_000, MAX);
        e.arm_backoff(2_000, MAX);

        assert!(e.apply(TimedValue::new("v".to_string(), 10_000), MIN));
        assert_eq!(e.backoff_ms(), MIN);
    }

    #[test]
    fn test_monotonic_freshness_rejects_older_expiry() {
        let mut e = entry();
        assert!(e.apply(TimedValue::new("new".to_string(), 10_000), MIN));

        // A slow earlier fetch completing late must not overwrite.
        assert!(!e.apply(TimedValue::new("old".to_string(), 9_000), MIN));
        assert!(!e.apply(TimedValue::new("same".to_string(), 10_000), MIN));
        assert_eq!(e.value().unwrap().value, "new");

        assert!(e.apply(TimedValue::new("newer".to_string(), 10_001), MIN));
        assert_eq!(e.value().unwrap().value, "newer");
    }

    #[test]
    fn test_touch_updates_access_time_but_peek_does_not() {
        let mut e = entry();
        e.apply(TimedValue::new("v".to_string(), 10_000), MIN);

        assert_eq!(e.last_access_at(), 1_000);
        let _ = e.value();
        assert_eq!(e.last_access_at(), 1_000);

        let _ = e.value_and_touch(5_000);
        assert_eq!(e.last_access_at(), 5_000);
    }

    #[test]
    fn test_touch_without_value_does_not_update_access_time() {
        let mut e = entry();
        assert!(e.value_and_touch(5_000).is_none());
        assert_eq!(e.last_access_at(), 1_000);
    }

    #[test]
    fn test_mark_dirty_keeps_value() {
        let mut e = entry();
        e.apply(TimedValue::new("v".to_string(), 10_000), MIN);
        assert!(!e.is_expired(5_000));

        e.mark_dirty();
        assert!(e.is_expired(5_000));
        assert_eq!(e.value().unwrap().value, "v");
    }

    #[test]
    fn test_idle_expiry() {
        let mut e = entry();
        e.apply(TimedValue::new("v".to_string(), 10_000), MIN);
        let _ = e.value_and_touch(2_000);

        assert!(!e.idle_expired(2_500, 1_000));
        assert!(e.idle_expired(3_001, 1_000));
    }

    #[test]
    fn test_suppressed_error_prefers_last_failure() {
        let mut e = entry();
        assert_eq!(e.suppressed_error(), Error::Backoff);

        e.refresh_settled(Some(Error::source("db down")));
        assert_eq!(e.suppressed_error(), Error::source("db down"));

        e.apply(TimedValue::new("v".to_string(), 10_000), MIN);
        assert_eq!(e.suppressed_error(), Error::Backoff);
    }

    #[test]
    fn test_remove_on_expired_flag() {
        let mut e = entry();
        assert!(!e.remove_on_expired());
        e.apply(
            TimedValue::new("v".to_string(), 10_000).remove_on_expired(),
            MIN,
        );
        assert!(e.remove_on_expired());
    }
}
