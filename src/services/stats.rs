//! Connection statistics queries over the canonical store

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::parsers::ParseOutcome;
use crate::services::{Aggregator, DataLoaderService, DatasetCache};
use crate::types::{Granularity, Result, SessionRecord, TimeBucketSeries, TimeWindow};

/// Answers "how many connections per bucket" for one application at a time,
/// re-reading the canonical store at most once per TTL.
pub struct StatsService {
    loader: DataLoaderService,
    cache: DatasetCache<ParseOutcome>,
}

impl StatsService {
    pub fn new(loader: DataLoaderService, ttl: Duration) -> Self {
        Self {
            loader,
            cache: DatasetCache::new(ttl),
        }
    }

    /// Parsed dataset as of `now`
    pub fn dataset(&mut self, now: DateTime<Utc>) -> Result<&ParseOutcome> {
        let loader = &self.loader;
        self.cache.get_or_recompute(now, || loader.load())
    }

    pub fn records(&mut self, now: DateTime<Utc>) -> Result<&[SessionRecord]> {
        Ok(&self.dataset(now)?.records)
    }

    /// Owner → applications, for picking what to chart
    pub fn applications(&mut self) -> Result<BTreeMap<String, Vec<String>>> {
        let records = self.records(Utc::now())?;
        Ok(Aggregator::applications_by_owner(records))
    }

    pub fn series(
        &mut self,
        application: &str,
        granularity: Granularity,
        window: TimeWindow,
    ) -> Result<TimeBucketSeries> {
        let records = self.records(Utc::now())?;
        Ok(Aggregator::bucket(records, application, granularity, window))
    }

    /// Series over the default window for `granularity` ending around `now`
    /// (local wall-clock time, matching the stored timestamps).
    pub fn recent_series(
        &mut self,
        application: &str,
        granularity: Granularity,
        now: NaiveDateTime,
    ) -> Result<TimeBucketSeries> {
        let window = TimeWindow::ending_at(now, granularity);
        self.series(application, granularity, window)
    }

    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }
}
