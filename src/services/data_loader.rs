//! Loading session records from the canonical store

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::{debug, warn};

use crate::parsers::{ParseOutcome, SessionParser};
use crate::types::{RawRow, Result, StatsError};

const SESSION_TABLE: &str = "session";

/// Reads the canonical store read-only and parses its `session` rows
pub struct DataLoaderService {
    canonical: PathBuf,
}

impl DataLoaderService {
    pub fn new(canonical: PathBuf) -> Self {
        Self { canonical }
    }

    pub fn canonical_path(&self) -> &Path {
        &self.canonical
    }

    /// Open the canonical store read-only. A consolidation may be running,
    /// so wait briefly on a locked database.
    fn open(&self) -> Result<Connection> {
        if !self.canonical.is_file() {
            return Err(StatsError::NoData(self.canonical.clone()));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.canonical, flags)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// All `session` rows in storage order, every column rendered as text.
    /// A store without a `session` table has no rows.
    pub fn session_rows(&self) -> Result<Vec<RawRow>> {
        let conn = self.open()?;

        let has_table = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [SESSION_TABLE],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !has_table {
            warn!(path = %self.canonical.display(), "canonical store has no session table");
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(&format!("SELECT * FROM {}", SESSION_TABLE))?;
        let width = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(value_to_text))
                    .collect::<rusqlite::Result<RawRow>>()
            })?
            .collect::<rusqlite::Result<Vec<RawRow>>>()?;

        debug!(rows = rows.len(), "read session rows");
        Ok(rows)
    }

    /// Read and parse. Unparseable rows are skipped and reported in the outcome.
    pub fn load(&self) -> Result<ParseOutcome> {
        let rows = self.session_rows()?;
        let outcome = SessionParser::parse_rows(&rows);
        if !outcome.rejected.is_empty() {
            warn!(
                rejected = outcome.rejected.len(),
                total = rows.len(),
                "some session rows could not be parsed"
            );
        }
        Ok(outcome)
    }
}

fn value_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}
