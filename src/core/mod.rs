pub mod comparator;
pub mod engine;
pub mod filter;
pub mod scanner;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use comparator::{CopyDecision, FileComparator};
pub use engine::{FilteredCounts, SyncEngine, SyncReport};
pub use filter::PathFilter;
pub use scanner::{Discovery, TreeScanner};
pub use transfer::{DirectoryCache, TransferExecutor, TransferOutcome};
