//! Time-to-live memoization of the parsed dataset

use chrono::{DateTime, Duration, Utc};

use crate::types::Result;

/// Holds one computed value and when it was computed
pub struct DatasetCache<T> {
    ttl: Duration,
    entry: Option<(DateTime<Utc>, T)>,
}

impl<T> DatasetCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn last_computed_at(&self) -> Option<DateTime<Utc>> {
        self.entry.as_ref().map(|(at, _)| *at)
    }

    /// True while a value exists and is no older than the TTL at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|(at, _)| now - *at <= self.ttl)
    }

    /// Return the cached value, recomputing it first when it is missing or
    /// `now - last_computed_at > ttl`. A failed recompute keeps the old value.
    pub fn get_or_recompute<F>(&mut self, now: DateTime<Utc>, compute: F) -> Result<&T>
    where
        F: FnOnce() -> Result<T>,
    {
        let entry = match self.entry.take() {
            Some(entry) if now - entry.0 <= self.ttl => entry,
            stale => match compute() {
                Ok(value) => (now, value),
                Err(e) => {
                    self.entry = stale;
                    return Err(e);
                }
            },
        };
        Ok(&self.entry.insert(entry).1)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
