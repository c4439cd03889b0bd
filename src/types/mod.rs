//! Type definitions for shinystats

mod error;
mod session;

pub use error::*;
pub use session::*;

/// A row the parser refused, kept for reporting
#[derive(Debug)]
pub struct RejectedRow {
    pub index: usize,
    pub error: StatsError,
}
