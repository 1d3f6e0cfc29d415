//! Per-row outcomes and the run summary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::MalformedFieldError;
use crate::models::{InventoryRecord, NormalizedRow, PersistedRecord};
use crate::store::TableStatus;

use super::pipeline::PipelineStage;

/// What happened to one source row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    Persisted(PersistedRecord),
    DuplicateSkipped { record: InventoryRecord },
    PersistFailed { record: InventoryRecord, reason: String },
    Malformed { cells: NormalizedRow, error: MalformedFieldError },
}

impl RowOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            RowOutcome::Persisted(_) => OutcomeKind::Persisted,
            RowOutcome::DuplicateSkipped { .. } => OutcomeKind::DuplicateSkipped,
            RowOutcome::PersistFailed { .. } => OutcomeKind::PersistFailed,
            RowOutcome::Malformed { .. } => OutcomeKind::Malformed,
        }
    }

    /// Identification number, when the row got far enough to have one
    pub fn vin(&self) -> Option<&str> {
        match self {
            RowOutcome::Persisted(persisted) => Some(persisted.record.vin()),
            RowOutcome::DuplicateSkipped { record } | RowOutcome::PersistFailed { record, .. } => Some(record.vin()),
            RowOutcome::Malformed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Persisted,
    DuplicateSkipped,
    PersistFailed,
    Malformed,
}

/// Outcome of one row, with its 1-based position in the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeRecord {
    pub row: usize,
    #[serde(flatten)]
    pub outcome: RowOutcome,
}

/// Counts per outcome kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub persisted: usize,
    pub duplicate_skipped: usize,
    pub persist_failed: usize,
    pub malformed: usize,
}

impl SyncSummary {
    pub fn record(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Persisted => self.persisted += 1,
            OutcomeKind::DuplicateSkipped => self.duplicate_skipped += 1,
            OutcomeKind::PersistFailed => self.persist_failed += 1,
            OutcomeKind::Malformed => self.malformed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.persisted + self.duplicate_skipped + self.persist_failed + self.malformed
    }

    /// Rows that did not make it into the table for a reason other than
    /// already being there
    pub fn failures(&self) -> usize {
        self.persist_failed + self.malformed
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Persisted={}, DuplicateSkipped={}, PersistFailed={}, MalformedFieldError={}",
            self.persisted, self.duplicate_skipped, self.persist_failed, self.malformed
        )
    }
}

/// Everything a completed run produced
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub source: String,
    pub table: String,
    pub table_status: TableStatus,
    pub summary: SyncSummary,
    pub outcomes: Vec<OutcomeRecord>,
    pub stages: Vec<PipelineStage>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    /// Outcomes of one kind, in source order
    pub fn outcomes_of(&self, kind: OutcomeKind) -> impl Iterator<Item = &OutcomeRecord> {
        self.outcomes.iter().filter(move |o| o.outcome.kind() == kind)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
