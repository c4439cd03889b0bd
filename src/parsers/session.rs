//! shinylogs `session` table parser

use crate::types::{RawRow, RejectedRow, Result, SessionRecord, StatsError};
use chrono::{NaiveDateTime, Timelike};
use rayon::prelude::*;
use tracing::warn;

/// Layout of the text left after the offset suffix is cut off
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Positional column names of the `session` table
const COLUMNS: [&str; 6] = [
    "app",
    "user",
    "server_connected",
    "sessionid",
    "server_disconnected",
    "user_agent",
];

/// Rows that parsed and rows that did not
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub records: Vec<SessionRecord>,
    pub rejected: Vec<RejectedRow>,
}

/// Parser for rows of the shinylogs `session` table
pub struct SessionParser;

impl SessionParser {
    /// Parse `"2023-05-01 10:15:30.123456+00:00"` into `2023-05-01T10:15:30`.
    ///
    /// Everything from the first `+` on is dropped and the remainder is
    /// truncated to whole seconds.
    pub fn parse_timestamp(raw: &str, row: usize) -> Result<NaiveDateTime> {
        let local = raw.split('+').next().unwrap_or(raw).trim();
        NaiveDateTime::parse_from_str(local, TIMESTAMP_FORMAT)
            .ok()
            .and_then(|ts| ts.with_nanosecond(0))
            .ok_or_else(|| StatsError::MalformedTimestamp {
                row,
                value: raw.to_string(),
            })
    }

    /// Parse one positional row. Columns past the sixth are ignored.
    pub fn parse_row(row: usize, raw: &[Option<String>]) -> Result<SessionRecord> {
        let application = column(raw, row, 0)?;
        let user = column(raw, row, 1)?;
        let connect = Self::parse_timestamp(column(raw, row, 2)?, row)?;
        let session_id = column(raw, row, 3)?;
        let disconnect = Self::parse_timestamp(column(raw, row, 4)?, row)?;
        let user_agent = column(raw, row, 5)?;

        Ok(SessionRecord {
            application: application.to_string(),
            user: user.to_string(),
            connect,
            disconnect,
            user_agent: user_agent.to_string(),
            session_id: session_id.to_string(),
        })
    }

    /// Parse all rows in parallel, skipping (and logging) rows that fail.
    /// Record order follows row order.
    pub fn parse_rows(rows: &[RawRow]) -> ParseOutcome {
        let results: Vec<Result<SessionRecord>> = rows
            .par_iter()
            .enumerate()
            .map(|(i, raw)| Self::parse_row(i, raw))
            .collect();

        let mut outcome = ParseOutcome {
            records: Vec::with_capacity(results.len()),
            rejected: Vec::new(),
        };

        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(record) => outcome.records.push(record),
                Err(error) => {
                    warn!(row = index, %error, "skipping session row");
                    outcome.rejected.push(RejectedRow { index, error });
                }
            }
        }

        outcome
    }
}

fn column(raw: &[Option<String>], row: usize, index: usize) -> Result<&str> {
    raw.get(index)
        .and_then(|v| v.as_deref())
        .ok_or(StatsError::MissingColumn {
            row,
            column: COLUMNS[index],
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(cols: &[&str]) -> RawRow {
        cols.iter().map(|c| Some(c.to_string())).collect()
    }

    fn sample_row(connect: &str) -> RawRow {
        row(&[
            "sales",
            "alice",
            connect,
            "a1b2c3",
            "2023-05-01 10:45:00.000001+00:00",
            "Mozilla/5.0",
        ])
    }

    #[test]
    fn test_parse_timestamp_drops_offset_and_fraction() {
        let ts = SessionParser::parse_timestamp("2023-05-01 10:15:30.123456+00:00", 0).unwrap();
        let expected = NaiveDate::from_ymd_opt(2023, 5, 1)
            .unwrap()
            .and_hms_opt(10, 15, 30)
            .unwrap();
        assert_eq!(ts, expected);
    }

    #[test]
    fn test_parse_timestamp_without_fraction() {
        let ts = SessionParser::parse_timestamp("2023-05-01 10:15:30+02:00", 0).unwrap();
        assert_eq!(ts.to_string(), "2023-05-01 10:15:30");
    }

    #[test]
    fn test_parse_timestamp_without_offset() {
        let ts = SessionParser::parse_timestamp("2023-05-01 10:15:30.5", 0).unwrap();
        assert_eq!(ts.to_string(), "2023-05-01 10:15:30");
    }

    #[test]
    fn test_parse_timestamp_malformed() {
        let err = SessionParser::parse_timestamp("01/05/2023 10:15+00:00", 7).unwrap_err();
        match err {
            StatsError::MalformedTimestamp { row, value } => {
                assert_eq!(row, 7);
                assert_eq!(value, "01/05/2023 10:15+00:00");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_row_positional_layout() {
        let record = SessionParser::parse_row(0, &sample_row("2023-05-01 10:15:30.1+00:00")).unwrap();
        assert_eq!(record.application, "sales");
        assert_eq!(record.user, "alice");
        assert_eq!(record.session_id, "a1b2c3");
        assert_eq!(record.user_agent, "Mozilla/5.0");
        assert_eq!(record.connect.to_string(), "2023-05-01 10:15:30");
        assert_eq!(record.disconnect.to_string(), "2023-05-01 10:45:00");
    }

    #[test]
    fn test_parse_row_ignores_trailing_columns() {
        let mut raw = sample_row("2023-05-01 10:15:30+00:00");
        raw.push(Some("1920x1080".into()));
        raw.push(None);
        assert!(SessionParser::parse_row(0, &raw).is_ok());
    }

    #[test]
    fn test_parse_row_null_disconnect() {
        let mut raw = sample_row("2023-05-01 10:15:30+00:00");
        raw[4] = None;
        let err = SessionParser::parse_row(2, &raw).unwrap_err();
        assert!(matches!(
            err,
            StatsError::MissingColumn {
                row: 2,
                column: "server_disconnected"
            }
        ));
    }

    #[test]
    fn test_parse_row_short_row() {
        let raw = row(&["sales", "alice"]);
        assert!(matches!(
            SessionParser::parse_row(0, &raw),
            Err(StatsError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_disconnect_before_connect_is_kept() {
        let raw = row(&[
            "sales",
            "alice",
            "2023-05-01 11:00:00+00:00",
            "s1",
            "2023-05-01 10:00:00+00:00",
            "curl",
        ]);
        let record = SessionParser::parse_row(0, &raw).unwrap();
        assert!(record.disconnect < record.connect);
    }

    #[test]
    fn test_parse_rows_skips_bad_rows() {
        let rows = vec![
            sample_row("2023-05-01 10:05:00+00:00"),
            sample_row("not a time"),
            sample_row("2023-05-01 10:40:00+00:00"),
        ];

        let outcome = SessionParser::parse_rows(&rows);

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].index, 1);
        assert_eq!(outcome.records[0].connect.to_string(), "2023-05-01 10:05:00");
        assert_eq!(outcome.records[1].connect.to_string(), "2023-05-01 10:40:00");
    }

    #[test]
    fn test_parse_rows_empty() {
        let outcome = SessionParser::parse_rows(&[]);
        assert!(outcome.records.is_empty());
        assert!(outcome.rejected.is_empty());
    }
}
