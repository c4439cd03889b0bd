//! Parsers for raw log store rows

mod session;

pub use session::{ParseOutcome, SessionParser};
