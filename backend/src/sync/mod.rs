//! Sync orchestration.
//!
//! - [`persister`] - Duplicate-safe write of one record
//! - [`report`] - Row outcomes and run summary
//! - [`pipeline`] - The staged run from connection to close

pub mod persister;
pub mod pipeline;
pub mod report;

pub use persister::{PersistOutcome, Persister};
pub use pipeline::{HaltedRun, PipelineStage, PreparedRow, SyncPipeline};
pub use report::{OutcomeKind, OutcomeRecord, RowOutcome, SyncReport, SyncSummary};
