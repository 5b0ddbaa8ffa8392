//! Bounded-staleness caches for broker snapshots.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// A single cached value with a freshness window.
///
/// One instance per engine per concern (positions, cash, daily loss), so a
/// logical decision reads one consistent snapshot instead of re-fetching per
/// sub-step. The caller supplies "now" so freshness follows the injected
/// clock.
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    slot: Mutex<Option<(T, DateTime<Utc>)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// The cached value, if still within the freshness window.
    pub fn get(&self, now: DateTime<Utc>) -> Option<T> {
        let slot = self.slot.lock().unwrap();
        match slot.as_ref() {
            Some((value, fetched_at)) if now - *fetched_at < self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    pub fn put(&self, value: T, now: DateTime<Utc>) {
        *self.slot.lock().unwrap() = Some((value, now));
    }

    pub fn invalidate(&self) {
        *self.slot.lock().unwrap() = None;
    }
}
