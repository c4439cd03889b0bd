//! Session and time-series types

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One raw `session` row as stored: positional columns, NULL as `None`.
pub type RawRow = Vec<Option<String>>;

/// A single connection to a Shiny application
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub application: String,
    pub user: String,
    pub connect: NaiveDateTime,
    /// May precede `connect` in damaged logs; carried through as-is.
    pub disconnect: NaiveDateTime,
    pub user_agent: String,
    pub session_id: String,
}

/// Bucket size for connection counts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Hour,
    Day,
    Month,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Hour, Granularity::Day, Granularity::Month];

    /// Start of the bucket containing `ts`.
    pub fn truncate(self, ts: NaiveDateTime) -> NaiveDateTime {
        let date = ts.date();
        match self {
            Granularity::Hour => {
                date.and_time(NaiveTime::from_hms_opt(ts.hour(), 0, 0).unwrap_or(NaiveTime::MIN))
            }
            Granularity::Day => date.and_time(NaiveTime::MIN),
            Granularity::Month => date.with_day(1).unwrap_or(date).and_time(NaiveTime::MIN),
        }
    }

    /// Nominal bar width in seconds. Months are a flat 30 days.
    pub fn width_secs(self) -> i64 {
        match self {
            Granularity::Hour => 3_600,
            Granularity::Day => 86_400,
            Granularity::Month => 30 * 86_400,
        }
    }

    /// Start of the bucket following the one starting at `start`.
    pub fn next(self, start: NaiveDateTime) -> NaiveDateTime {
        match self {
            Granularity::Hour => start + Duration::hours(1),
            Granularity::Day => start + Duration::days(1),
            Granularity::Month => start
                .checked_add_months(chrono::Months::new(1))
                .unwrap_or(start + Duration::days(30)),
        }
    }

    /// Axis label ("Hour", "Day", "Month")
    pub fn axis_label(self) -> &'static str {
        match self {
            Granularity::Hour => "Hour",
            Granularity::Day => "Day",
            Granularity::Month => "Month",
        }
    }

    /// Title adjective ("Hourly", "Daily", "Monthly")
    pub fn adjective(self) -> &'static str {
        match self {
            Granularity::Hour => "Hourly",
            Granularity::Day => "Daily",
            Granularity::Month => "Monthly",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Month => "month",
        };
        f.write_str(s)
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hour" | "hourly" | "h" => Ok(Granularity::Hour),
            "day" | "daily" | "d" => Ok(Granularity::Day),
            "month" | "monthly" | "m" => Ok(Granularity::Month),
            other => Err(format!(
                "unknown granularity '{}' (expected hour, day or month)",
                other
            )),
        }
    }
}

/// Inclusive time range a chart is drawn over
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Default dashboard window ending just after `now`:
    /// hour → last 2 days, day → last 30 days, month → last 365 days.
    pub fn ending_at(now: NaiveDateTime, granularity: Granularity) -> Self {
        let (lead, span) = match granularity {
            Granularity::Hour => (Duration::hours(1), Duration::days(2)),
            Granularity::Day => (Duration::days(1), Duration::days(30)),
            Granularity::Month => (Duration::days(1), Duration::days(365)),
        };
        let end = now + lead;
        Self {
            start: end - span,
            end,
        }
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// One bar of a connection chart
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bucket {
    pub start: NaiveDateTime,
    pub count: u64,
}

/// Connection counts for one application at a fixed granularity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeBucketSeries {
    pub application: String,
    /// First user seen for the application, if any
    pub owner: Option<String>,
    pub granularity: Granularity,
    pub window: TimeWindow,
    pub bucket_width_secs: i64,
    pub buckets: Vec<Bucket>,
}

impl TimeBucketSeries {
    pub fn total(&self) -> u64 {
        self.buckets
            .iter()
            .fold(0u64, |acc, b| acc.saturating_add(b.count))
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Chart title, e.g. "Hourly connections for sales (alice)"
    pub fn title(&self) -> String {
        match &self.owner {
            Some(owner) => format!(
                "{} connections for {} ({})",
                self.granularity.adjective(),
                self.application,
                owner
            ),
            None => format!(
                "{} connections for {}",
                self.granularity.adjective(),
                self.application
            ),
        }
    }
}
