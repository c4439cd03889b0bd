use std::path::PathBuf;

use thiserror::Error;

/// shinystats error types
#[derive(Error, Debug)]
pub enum StatsError {
    /// Nothing was staged, so there is nothing to merge
    #[error("no staged log stores found in {}", .0.display())]
    NoData(PathBuf),

    /// A staged store's table cannot be merged into the canonical store
    #[error("incompatible schema for table '{table}' in {}: {reason}", .store.display())]
    IncompatibleSchema {
        store: PathBuf,
        table: String,
        reason: String,
    },

    /// A timestamp column did not match `YYYY-MM-DD HH:MM:SS[.ffffff]`
    #[error("malformed timestamp in row {row}: {value:?}")]
    MalformedTimestamp { row: usize, value: String },

    /// A required positional column was absent or NULL
    #[error("missing column '{column}' in row {row}")]
    MissingColumn { row: usize, column: &'static str },

    /// SQLite error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Consolidation lock could not be taken
    #[error("lock error: {0}")]
    Lock(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

/// Result type alias for shinystats
pub type Result<T> = std::result::Result<T, StatsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StatsError::MalformedTimestamp {
            row: 3,
            value: "yesterday".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed timestamp in row 3: \"yesterday\""
        );
    }

    #[test]
    fn test_no_data_names_directory() {
        let err = StatsError::NoData(PathBuf::from("/srv/stats/staging"));
        assert_eq!(
            err.to_string(),
            "no staged log stores found in /srv/stats/staging"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StatsError = io_err.into();
        assert!(err.to_string().contains("io error"));
    }
}
