//! Aggregator service for bucketing connections over time

use crate::types::{Bucket, Granularity, SessionRecord, TimeBucketSeries, TimeWindow};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Aggregator for computing connection statistics
pub struct Aggregator;

impl Aggregator {
    /// Count connections to `application` per bucket (sorted ascending).
    ///
    /// With no matching records the series holds exactly two zero buckets at
    /// the window endpoints so an empty chart still has an axis. Populated
    /// series are sparse: gaps between buckets are not zero-filled (see
    /// [`Aggregator::fill_gaps`]) and records outside `window` still count.
    pub fn bucket(
        records: &[SessionRecord],
        application: &str,
        granularity: Granularity,
        window: TimeWindow,
    ) -> TimeBucketSeries {
        let owner = Self::owner_of(records, application);

        let mut counts: HashMap<NaiveDateTime, u64> = HashMap::new();
        for record in records.iter().filter(|r| r.application == application) {
            let key = granularity.truncate(record.connect);
            let count = counts.entry(key).or_insert(0);
            *count = count.saturating_add(1);
        }

        let buckets = if counts.is_empty() {
            vec![
                Bucket {
                    start: window.start,
                    count: 0,
                },
                Bucket {
                    start: window.end,
                    count: 0,
                },
            ]
        } else {
            let mut buckets: Vec<Bucket> = counts
                .into_iter()
                .map(|(start, count)| Bucket { start, count })
                .collect();
            buckets.sort_by_key(|b| b.start);
            buckets
        };

        TimeBucketSeries {
            application: application.to_string(),
            owner,
            granularity,
            window,
            bucket_width_secs: granularity.width_secs(),
            buckets,
        }
    }

    /// Dense variant of a series: one bucket per period across the window,
    /// zero where nothing connected. Buckets outside the window are kept.
    pub fn fill_gaps(series: &TimeBucketSeries) -> TimeBucketSeries {
        let granularity = series.granularity;
        let counts: HashMap<NaiveDateTime, u64> = series
            .buckets
            .iter()
            .filter(|b| b.count > 0)
            .map(|b| (b.start, b.count))
            .collect();

        let mut starts: BTreeSet<NaiveDateTime> = counts.keys().copied().collect();
        let last = granularity.truncate(series.window.end);
        let mut cursor = granularity.truncate(series.window.start);
        while cursor <= last {
            starts.insert(cursor);
            cursor = granularity.next(cursor);
        }

        let buckets = starts
            .into_iter()
            .map(|start| Bucket {
                start,
                count: counts.get(&start).copied().unwrap_or(0),
            })
            .collect();

        TimeBucketSeries {
            buckets,
            ..series.clone()
        }
    }

    /// Owner → sorted distinct applications
    pub fn applications_by_owner(records: &[SessionRecord]) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for record in records {
            map.entry(record.user.clone())
                .or_default()
                .insert(record.application.clone());
        }
        map.into_iter()
            .map(|(owner, apps)| (owner, apps.into_iter().collect()))
            .collect()
    }

    /// User of the first record for `application`.
    ///
    /// An application is assumed to belong to one user; when several users
    /// share an application name the earliest row wins.
    pub fn owner_of(records: &[SessionRecord], application: &str) -> Option<String> {
        records
            .iter()
            .find(|r| r.application == application)
            .map(|r| r.user.clone())
    }
}
