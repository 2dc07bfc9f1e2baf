pub mod analyzer;
pub mod classify;
pub mod dedup;
pub mod moderation;
pub mod monitor;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod synthesis;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

#[cfg(test)]
mod dedup_tests;

pub use analyzer::{Analysis, KeywordAnalyzer};
pub use dedup::{DedupEngine, Resolution};
pub use moderation::{CaseDetail, CaseService};
pub use monitor::{ErrorScope, Monitor, MonitorError};
pub use scheduler::MonitorScheduler;
pub use stats::{CycleReport, CycleSummary};
pub use store::PgCaseStore;
