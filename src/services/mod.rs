//! Services for consolidating log stores and computing connection statistics

pub mod aggregator;
pub mod cache;
pub mod consolidator;
pub mod data_loader;
pub mod enumerator;
pub mod stats;

pub use aggregator::Aggregator;
pub use cache::DatasetCache;
pub use consolidator::{Consolidator, CANONICAL_FILE};
pub use data_loader::DataLoaderService;
pub use enumerator::{SourceCandidate, SourceEnumerator};
pub use stats::StatsService;
