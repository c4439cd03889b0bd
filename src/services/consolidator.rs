//! Consolidation of staged shinylogs stores into one canonical store
//!
//! Layout under the configured root:
//! - `staging/<owner>_<application>.sqlite`: copies waiting to be merged
//! - `shiny_database.sqlite`: the canonical store
//! - `.consolidate.lock`: held exclusively while a run is in progress
//!
//! Each staged store is merged in its own transaction and deleted only after
//! that transaction commits, so a failed run can simply be repeated.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::services::enumerator::SourceCandidate;
use crate::types::{Result, StatsError};

/// File name of the canonical store inside the root directory
pub const CANONICAL_FILE: &str = "shiny_database.sqlite";

const STAGING_DIR: &str = "staging";
const LOCK_FILE: &str = ".consolidate.lock";
const STAGED_EXTENSION: &str = "sqlite";
const ATTACH_ALIAS: &str = "staged";

/// Outcome of copying sources into the staging area
#[derive(Debug, Default)]
pub struct StageReport {
    /// Staged copies written by this run
    pub staged: Vec<PathBuf>,
    /// Candidates whose log file does not exist (yet)
    pub skipped: Vec<SourceCandidate>,
}

/// Rows contributed by one table of one staged store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMerge {
    pub table: String,
    pub inserted: usize,
    /// Table did not exist in the canonical store and was created
    pub created: bool,
}

/// Result of merging one staged store
#[derive(Debug, Clone)]
pub struct StoreMerge {
    pub store: PathBuf,
    pub tables: Vec<TableMerge>,
}

impl StoreMerge {
    pub fn rows_inserted(&self) -> usize {
        self.tables.iter().map(|t| t.inserted).sum()
    }
}

#[derive(Debug, Default)]
pub struct MergeReport {
    /// Staged store renamed into place as a fresh canonical store
    pub promoted: Option<PathBuf>,
    /// Duplicate rows dropped from the promoted store before the rename
    pub promoted_duplicates: usize,
    pub merged: Vec<StoreMerge>,
}

impl MergeReport {
    pub fn rows_inserted(&self) -> usize {
        self.merged.iter().map(StoreMerge::rows_inserted).sum()
    }
}

#[derive(Debug, Default)]
pub struct ConsolidationReport {
    pub stage: StageReport,
    pub merge: MergeReport,
}

/// Exclusive advisory lock on the root directory, released on drop
struct ConsolidationLock {
    file: File,
}

impl Drop for ConsolidationLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Stages and merges log stores under one root directory
pub struct Consolidator {
    root: PathBuf,
}

impl Consolidator {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn canonical_path(&self) -> PathBuf {
        self.root.join(CANONICAL_FILE)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Stage, then merge everything in the staging area, holding the lock.
    pub fn consolidate(&self, sources: &[SourceCandidate]) -> Result<ConsolidationReport> {
        let _lock = self.lock()?;
        let stage = self.stage(sources)?;
        let staged = self.staged_stores()?;
        let merge = self.merge(&staged)?;
        Ok(ConsolidationReport { stage, merge })
    }

    /// `stage` while holding the lock.
    pub fn scrape(&self, sources: &[SourceCandidate]) -> Result<StageReport> {
        let _lock = self.lock()?;
        self.stage(sources)
    }

    /// Merge everything in the staging area while holding the lock.
    pub fn combine(&self) -> Result<MergeReport> {
        let _lock = self.lock()?;
        let staged = self.staged_stores()?;
        self.merge(&staged)
    }

    /// Copy every existing source into the staging area as
    /// `<owner>_<application>.sqlite`. Missing sources are skipped.
    ///
    /// An existing staged file of the same name is overwritten, including one
    /// kept by a failed run.
    pub fn stage(&self, sources: &[SourceCandidate]) -> Result<StageReport> {
        let staging = self.staging_dir();
        fs::create_dir_all(&staging)?;

        let mut report = StageReport::default();
        let mut written = HashSet::new();
        for candidate in sources {
            if !candidate.path.is_file() {
                debug!(
                    owner = %candidate.owner,
                    application = %candidate.application,
                    path = %candidate.path.display(),
                    "source unavailable, skipping"
                );
                report.skipped.push(candidate.clone());
                continue;
            }

            let target = staging.join(candidate.staged_name());
            if !written.insert(target.clone()) {
                warn!(
                    owner = %candidate.owner,
                    application = %candidate.application,
                    target = %target.display(),
                    "staged name collision, overwriting a store staged by this run"
                );
            }
            fs::copy(&candidate.path, &target)?;
            debug!(target = %target.display(), "staged log store");
            report.staged.push(target);
        }

        info!(
            staged = report.staged.len(),
            skipped = report.skipped.len(),
            "staging complete"
        );
        Ok(report)
    }

    /// Staged stores in merge order (sorted by file name), including any
    /// left behind by an earlier failed run.
    pub fn staged_stores(&self) -> Result<Vec<PathBuf>> {
        let staging = self.staging_dir();
        if !staging.exists() {
            return Ok(Vec::new());
        }

        let mut stores: Vec<PathBuf> = fs::read_dir(&staging)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(STAGED_EXTENSION))
            .collect();
        stores.sort();
        Ok(stores)
    }

    /// Merge `staged` into the canonical store, deleting each staged file
    /// once its rows are committed.
    ///
    /// Without an existing canonical store the first staged store is
    /// deduplicated and renamed into place. A failure aborts the run: stores
    /// merged so far stay merged and the failing store's file is left in the
    /// staging area.
    pub fn merge(&self, staged: &[PathBuf]) -> Result<MergeReport> {
        if staged.is_empty() {
            return Err(StatsError::NoData(self.staging_dir()));
        }

        let canonical = self.canonical_path();
        let mut report = MergeReport::default();
        let mut pending = staged.iter();

        if !canonical.exists() {
            if let Some(first) = pending.next() {
                let removed = match dedup_store(first) {
                    Ok(removed) => removed,
                    Err(e) => {
                        warn!(store = %first.display(), error = %e, "cannot promote, keeping staged store");
                        return Err(e);
                    }
                };
                fs::rename(first, &canonical)?;
                info!(
                    store = %first.display(),
                    duplicates = removed,
                    "promoted staged store to canonical"
                );
                report.promoted = Some(first.clone());
                report.promoted_duplicates = removed;
            }
        }

        let mut conn = Connection::open(&canonical)?;
        for store in pending {
            let merged = match merge_store(&mut conn, store) {
                Ok(merged) => merged,
                Err(e) => {
                    warn!(store = %store.display(), error = %e, "merge failed, keeping staged store");
                    return Err(e);
                }
            };
            fs::remove_file(store)?;
            info!(
                store = %store.display(),
                rows = merged.rows_inserted(),
                "merged staged store"
            );
            report.merged.push(merged);
        }

        Ok(report)
    }

    fn lock(&self) -> Result<ConsolidationLock> {
        fs::create_dir_all(&self.root)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.root.join(LOCK_FILE))?;
        file.try_lock_exclusive().map_err(|e| {
            StatsError::Lock(format!(
                "another consolidation holds {}: {}",
                self.root.display(),
                e
            ))
        })?;
        Ok(ConsolidationLock { file })
    }
}

/// Delete exact-duplicate rows from every table of `store`, keeping the
/// first copy of each, in one transaction. Fails for a file that is not a
/// readable SQLite database.
fn dedup_store(store: &Path) -> Result<usize> {
    let mut conn = Connection::open(store)?;
    let tx = conn.transaction()?;

    // WITHOUT ROWID tables always have a primary key, so hold no exact duplicates
    let tables: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT name FROM pragma_table_list
             WHERE schema = 'main' AND type = 'table' AND wr = 0
               AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
             ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut removed = 0;
    for table in tables {
        let columns = table_columns(&tx, "main", &table)?
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let name = quote_ident(&table);
        let deleted = tx.execute(
            &format!(
                "DELETE FROM {name} WHERE rowid NOT IN
                 (SELECT MIN(rowid) FROM {name} GROUP BY {columns})",
                name = name,
                columns = columns
            ),
            [],
        )?;
        if deleted > 0 {
            debug!(table = %table, rows = deleted, "removed duplicate rows");
        }
        removed += deleted;
    }

    tx.commit()?;
    Ok(removed)
}

/// Attach `store`, copy its tables in one transaction, then detach.
fn merge_store(conn: &mut Connection, store: &Path) -> Result<StoreMerge> {
    let path = store.to_string_lossy().into_owned();
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {}", ATTACH_ALIAS),
        [path.as_str()],
    )?;

    let copied = copy_tables(conn, store);
    let detached = conn.execute_batch(&format!("DETACH DATABASE {}", ATTACH_ALIAS));

    match (copied, detached) {
        (Ok(tables), Ok(())) => Ok(StoreMerge {
            store: store.to_path_buf(),
            tables,
        }),
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(StatsError::from(e)),
    }
}

/// Insert-or-ignore every row of every attached table into `main`.
///
/// Rows already present in `main` are excluded by full-row comparison, so
/// tables without a uniqueness constraint are deduplicated too. Tables
/// missing from `main` are created from the attached store's definition;
/// tables whose columns differ are rejected.
fn copy_tables(conn: &mut Connection, store: &Path) -> Result<Vec<TableMerge>> {
    let tx = conn.transaction()?;

    let tables: Vec<(String, Option<String>)> = {
        let mut stmt = tx.prepare(&format!(
            "SELECT name, sql FROM {}.sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
             ORDER BY name",
            ATTACH_ALIAS
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut merged = Vec::with_capacity(tables.len());
    for (table, create_sql) in tables {
        let staged_columns = table_columns(&tx, ATTACH_ALIAS, &table)?;
        let main_columns = table_columns(&tx, "main", &table)?;

        let created = if main_columns.is_empty() {
            let sql = create_sql.ok_or_else(|| StatsError::IncompatibleSchema {
                store: store.to_path_buf(),
                table: table.clone(),
                reason: "table has no CREATE statement".to_string(),
            })?;
            tx.execute_batch(&sql)?;
            debug!(table = %table, "created table missing from canonical store");
            true
        } else if main_columns != staged_columns {
            return Err(StatsError::IncompatibleSchema {
                store: store.to_path_buf(),
                table,
                reason: format!(
                    "columns ({}) do not match canonical ({})",
                    staged_columns.join(", "),
                    main_columns.join(", ")
                ),
            });
        } else {
            false
        };

        let name = quote_ident(&table);
        let inserted = tx.execute(
            &format!(
                "INSERT OR IGNORE INTO main.{name}
                 SELECT * FROM {alias}.{name}
                 EXCEPT SELECT * FROM main.{name}",
                name = name,
                alias = ATTACH_ALIAS
            ),
            [],
        )?;

        merged.push(TableMerge {
            table,
            inserted,
            created,
        });
    }

    tx.commit()?;
    Ok(merged)
}

/// Column names of `schema.table` in declaration order; empty if absent.
fn table_columns(conn: &Connection, schema: &str, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1, ?2) ORDER BY cid")?;
    let columns = stmt
        .query_map([table, schema], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(columns)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
