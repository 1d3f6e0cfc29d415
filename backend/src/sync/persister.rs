//! Duplicate-safe persister.
//!
//! Writes one record at a time. The store's uniqueness constraint decides
//! what a duplicate is; the lookup before the insert only saves a round trip.

use serde::Serialize;

use crate::logs::log_warning_indent;
use crate::models::InventoryRecord;
use crate::store::InventoryStore;

/// Result of persisting one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistOutcome {
    Persisted { stock_number: i32 },
    DuplicateSkipped,
    PersistFailed { reason: String },
}

/// Persists records into an [`InventoryStore`]
#[derive(Debug, Clone, Copy)]
pub struct Persister {
    precheck: bool,
}

impl Default for Persister {
    fn default() -> Self {
        Self { precheck: true }
    }
}

impl Persister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the lookup before each insert
    pub fn with_precheck(mut self, precheck: bool) -> Self {
        self.precheck = precheck;
        self
    }

    pub fn precheck(&self) -> bool {
        self.precheck
    }

    /// Persist one record. Never fails: every store error becomes an outcome.
    pub async fn persist<S: InventoryStore>(&self, store: &mut S, record: &InventoryRecord) -> PersistOutcome {
        if self.precheck {
            match store.contains(record.vin()).await {
                Ok(true) => return PersistOutcome::DuplicateSkipped,
                Ok(false) => {}
                Err(e) => {
                    log_warning_indent(format!("Lookup of {} failed, inserting anyway: {}", record.vin(), e), 2);
                }
            }
        }

        match store.insert(record).await {
            Ok(stock_number) => PersistOutcome::Persisted { stock_number },
            Err(e) if e.is_unique_violation() => PersistOutcome::DuplicateSkipped,
            Err(e) => PersistOutcome::PersistFailed { reason: e.to_string() },
        }
    }
}
