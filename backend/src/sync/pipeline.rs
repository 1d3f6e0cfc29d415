//! Sync pipeline orchestrator.
//!
//! Runs the stages of one sync in a fixed order:
//!
//! ```text
//! Init → ConnectionReady → SchemaReady → SourceFetched → Normalizing → Persisting → Closed
//! ```
//!
//! Connection, schema and fetch failures halt the run in `Failed`, returned
//! as a [`HaltedRun`]. Everything that goes wrong with a single row is
//! recorded as that row's outcome and the run moves on to the next row.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;

use super::persister::{PersistOutcome, Persister};
use super::report::{OutcomeRecord, RowOutcome, SyncReport, SyncSummary};
use crate::error::{FatalStage, MalformedFieldError, PipelineError, PipelineResult};
use crate::logs::{log_error, log_info, log_info_indent, log_success, log_success_indent, log_warning, log_warning_indent};
use crate::models::{InventoryRecord, NormalizedRow, PersistedRecord, RawRow};
use crate::source::RowSource;
use crate::store::{ensure_table, InventoryStore, StoreConnector, TableStatus};
use crate::transform::{map_record, RowNormalizer, TransformChain};

// =============================================================================
// Stages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Init,
    ConnectionReady,
    SchemaReady,
    SourceFetched,
    Normalizing,
    Persisting,
    Closed,
    Failed(FatalStage),
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Init => f.write_str("init"),
            PipelineStage::ConnectionReady => f.write_str("connection ready"),
            PipelineStage::SchemaReady => f.write_str("schema ready"),
            PipelineStage::SourceFetched => f.write_str("source fetched"),
            PipelineStage::Normalizing => f.write_str("normalizing"),
            PipelineStage::Persisting => f.write_str("persisting"),
            PipelineStage::Closed => f.write_str("closed"),
            PipelineStage::Failed(stage) => write!(f, "failed at {}", stage),
        }
    }
}

/// Stages a run has gone through, in order
#[derive(Debug, Clone)]
struct StageTracker {
    stages: Vec<PipelineStage>,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stages: vec![PipelineStage::Init],
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        self.stages.push(stage);
    }

    fn fail(mut self, error: PipelineError) -> HaltedRun {
        let stage = error.stage();
        log_error(format!("Sync halted: {} failed", stage));
        self.stages.push(PipelineStage::Failed(stage));
        HaltedRun {
            error,
            stages: self.stages,
        }
    }
}

/// A run that stopped at a fatal stage
#[derive(Debug, Error)]
#[error("{error}")]
pub struct HaltedRun {
    pub error: PipelineError,
    /// Stages reached, ending with `Failed`
    pub stages: Vec<PipelineStage>,
}

impl HaltedRun {
    /// Setup failure, before any connection was attempted
    pub fn before_start(error: impl Into<PipelineError>) -> Self {
        let error = error.into();
        log_error(error.to_string());
        StageTracker::new().fail(error)
    }

    pub fn stage(&self) -> FatalStage {
        self.error.stage()
    }

    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&json!({
            "error": self.error.to_string(),
            "failed": self.stage(),
            "exit_code": self.exit_code(),
            "stages": self.stages,
        }))
    }
}

impl From<HaltedRun> for PipelineError {
    fn from(halted: HaltedRun) -> Self {
        halted.error
    }
}

// =============================================================================
// Row preparation
// =============================================================================

/// A source row after normalization and mapping
#[derive(Debug, Clone)]
pub struct PreparedRow {
    /// 1-based position in the source
    pub row: usize,
    pub normalized: NormalizedRow,
    pub mapped: Result<InventoryRecord, MalformedFieldError>,
}

/// What the schema/fetch/persist stages produced on an open connection
struct ConnectedRun {
    table_status: TableStatus,
    outcomes: Vec<OutcomeRecord>,
    summary: SyncSummary,
}

// =============================================================================
// Pipeline
// =============================================================================

/// One configured sync: a normalizer and a persister, reusable across runs
#[derive(Debug, Clone, Default)]
pub struct SyncPipeline {
    normalizer: RowNormalizer,
    persister: Persister,
}

impl SyncPipeline {
    pub fn new(chain: TransformChain) -> Self {
        Self {
            normalizer: RowNormalizer::new(chain),
            persister: Persister::default(),
        }
    }

    pub fn with_persister(mut self, persister: Persister) -> Self {
        self.persister = persister;
        self
    }

    pub fn normalizer(&self) -> &RowNormalizer {
        &self.normalizer
    }

    /// Normalize and map rows without touching a store
    pub fn prepare(&self, rows: &[RawRow]) -> Vec<PreparedRow> {
        rows.iter()
            .enumerate()
            .map(|(i, raw)| self.prepare_row(i + 1, raw))
            .collect()
    }

    fn prepare_row(&self, row: usize, raw: &[String]) -> PreparedRow {
        let normalized = self.normalizer.normalize(raw);
        let mapped = map_record(&normalized);
        PreparedRow {
            row,
            normalized,
            mapped,
        }
    }

    /// Run one sync.
    ///
    /// The source is only read once the table is ready. The connection is
    /// closed on every path that opened it.
    pub async fn run<C, R>(&self, connector: &C, source: &R) -> Result<SyncReport, HaltedRun>
    where
        C: StoreConnector,
        R: RowSource,
    {
        let started_at = Utc::now();
        let mut stages = StageTracker::new();

        log_info(format!("🔌 Connecting to {}", connector.describe()));
        let mut store = match connector.connect().await {
            Ok(store) => store,
            Err(e) => {
                log_error(format!("Connection failed: {}", e));
                return Err(stages.fail(e.into()));
            }
        };
        log_success("Connected");
        stages.enter(PipelineStage::ConnectionReady);

        let table = store.table_name().to_string();
        let result = self.run_connected(&mut store, source, &mut stages).await;

        match store.close().await {
            Ok(()) => log_info("Connection closed"),
            Err(e) => log_warning(format!("Failed to close connection: {}", e)),
        }

        let run = match result {
            Ok(run) => run,
            Err(e) => {
                log_error(e.to_string());
                return Err(stages.fail(e));
            }
        };
        stages.enter(PipelineStage::Closed);

        log_success(format!("Sync complete: {}", run.summary));

        Ok(SyncReport {
            source: source.describe(),
            table,
            table_status: run.table_status,
            summary: run.summary,
            outcomes: run.outcomes,
            stages: stages.stages,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn run_connected<S, R>(&self, store: &mut S, source: &R, stages: &mut StageTracker) -> PipelineResult<ConnectedRun>
    where
        S: InventoryStore,
        R: RowSource,
    {
        // Schema
        log_info(format!("📋 Checking table '{}'", store.table_name()));
        let table_status = ensure_table(store).await?;
        match table_status {
            TableStatus::Existing => log_success("Table exists"),
            TableStatus::Created => log_success("Table created"),
        }
        stages.enter(PipelineStage::SchemaReady);

        // Fetch
        log_info(format!("📥 Fetching rows from {}", source.describe()));
        let rows = source.fetch_rows().await?;
        log_success(format!("Fetched {} rows", rows.len()));
        stages.enter(PipelineStage::SourceFetched);

        // Normalize, map and persist, one row at a time
        stages.enter(PipelineStage::Normalizing);
        stages.enter(PipelineStage::Persisting);
        log_info(format!("💾 Persisting {} rows", rows.len()));

        let mut summary = SyncSummary::default();
        let mut outcomes = Vec::with_capacity(rows.len());

        for (i, raw) in rows.iter().enumerate() {
            let PreparedRow { row, normalized, mapped } = self.prepare_row(i + 1, raw);
            let outcome = match mapped {
                Ok(record) => self.persist_row(store, row, record).await,
                Err(error) => {
                    log_warning_indent(format!("Row {}: {}", row, error), 1);
                    RowOutcome::Malformed { cells: normalized, error }
                }
            };
            summary.record(outcome.kind());
            outcomes.push(OutcomeRecord { row, outcome });
        }

        Ok(ConnectedRun {
            table_status,
            outcomes,
            summary,
        })
    }

    async fn persist_row<S: InventoryStore>(&self, store: &mut S, row: usize, record: InventoryRecord) -> RowOutcome {
        match self.persister.persist(store, &record).await {
            PersistOutcome::Persisted { stock_number } => {
                log_success_indent(format!("Row {}: {} stored as #{}", row, record.vin(), stock_number), 1);
                RowOutcome::Persisted(PersistedRecord { stock_number, record })
            }
            PersistOutcome::DuplicateSkipped => {
                log_info_indent(format!("Row {}: {} already present, skipped", row, record.vin()), 1);
                RowOutcome::DuplicateSkipped { record }
            }
            PersistOutcome::PersistFailed { reason } => {
                log_warning_indent(format!("Row {}: {} not stored: {}", row, record.vin(), reason), 1);
                RowOutcome::PersistFailed { record, reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, FetchError, FetchResult, MalformedReason, StoreError};
    use crate::source::StaticSource;
    use crate::store::memory::tests::record;
    use crate::store::MemoryConnector;
    use crate::sync::report::OutcomeKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MUSTANG: &str = "1FA6P8TH5E5000001";
    const CAMRY: &str = "4T1B11HK5JU000002";
    const TACOMA: &str = "3TMCZ5AN1KM000003";

    fn raw(vin: &str, year: &str, mileage: &str) -> Vec<String> {
        [
            vin,
            "Toyota",
            "Tacoma",
            year,
            mileage,
            "$31,500.00",
            "Used",
            "Silver",
            "Black",
            "3.5L V6",
            "CVT",
            "Four-Wheel Drive",
            "Gasoline",
            "Pickup Truck",
            "5",
            "4",
            "",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn pipeline() -> SyncPipeline {
        SyncPipeline::new(TransformChain::inventory_defaults())
    }

    /// Counts fetches, optionally failing them
    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSource {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RowSource for CountingSource {
        async fn fetch_rows(&self) -> FetchResult<Vec<RawRow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FetchError::Status {
                    status: 403,
                    message: "The caller does not have permission".to_string(),
                });
            }
            Ok(vec![raw(MUSTANG, "2014", "12,345")])
        }

        fn describe(&self) -> String {
            "counting source".to_string()
        }
    }

    #[tokio::test]
    async fn test_two_new_one_already_stored() {
        let connector = MemoryConnector::new().seeded([record(TACOMA)]);
        let source = StaticSource::new(vec![
            raw(MUSTANG, "2014", "12,345"),
            raw(CAMRY, "2018", "40,000"),
            raw(TACOMA, "2019", "8,000"),
        ]);

        let report = pipeline().run(&connector, &source).await.unwrap();

        assert_eq!(report.summary.persisted, 2);
        assert_eq!(report.summary.duplicate_skipped, 1);
        assert_eq!(report.summary.persist_failed, 0);
        assert_eq!(report.summary.malformed, 0);
        assert_eq!(report.table_status, TableStatus::Existing);
        assert_eq!(connector.records().len(), 3);
        assert_eq!(connector.connections_closed(), 1);

        let skipped: Vec<_> = report.outcomes_of(OutcomeKind::DuplicateSkipped).collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].row, 3);
        assert_eq!(skipped[0].outcome.vin(), Some(TACOMA));
    }

    #[tokio::test]
    async fn test_stages_in_order() {
        let connector = MemoryConnector::new();
        let source = StaticSource::new(vec![raw(MUSTANG, "2014", "100")]);

        let report = pipeline().run(&connector, &source).await.unwrap();

        assert_eq!(
            report.stages,
            vec![
                PipelineStage::Init,
                PipelineStage::ConnectionReady,
                PipelineStage::SchemaReady,
                PipelineStage::SourceFetched,
                PipelineStage::Normalizing,
                PipelineStage::Persisting,
                PipelineStage::Closed,
            ]
        );
        assert_eq!(report.table_status, TableStatus::Created);
        assert!(report.finished_at >= report.started_at);
    }

    #[tokio::test]
    async fn test_rows_are_normalized_before_storing() {
        let connector = MemoryConnector::new();
        let source = StaticSource::new(vec![raw(MUSTANG, "2014", " 12,345 ")]);

        pipeline().run(&connector, &source).await.unwrap();

        let stored = &connector.records()[0].record;
        assert_eq!(stored.mileage, 12345);
        assert_eq!(stored.transmission, "Automatic");
        assert_eq!(stored.drive_train, "4WD");
        assert_eq!(stored.body_style, "Pickup");
        assert_eq!(stored.notes, None);
    }

    #[tokio::test]
    async fn test_same_vin_twice_in_one_batch() {
        let connector = MemoryConnector::new();
        let source = StaticSource::new(vec![raw(MUSTANG, "2014", "100"), raw(MUSTANG, "2014", "200")]);

        let report = pipeline().run(&connector, &source).await.unwrap();

        assert_eq!(report.summary.persisted, 1);
        assert_eq!(report.summary.duplicate_skipped, 1);
        assert_eq!(report.outcomes[1].outcome.kind(), OutcomeKind::DuplicateSkipped);
        assert_eq!(connector.count_vin(MUSTANG), 1);
        assert_eq!(connector.records()[0].record.mileage, 100);
    }

    #[tokio::test]
    async fn test_malformed_row_does_not_stop_the_batch() {
        let connector = MemoryConnector::new();
        let source = StaticSource::new(vec![
            raw(MUSTANG, "MMXX", "100"),
            raw(CAMRY, "2018", "200"),
            vec!["ONLY-A-VIN".to_string()],
        ]);

        let report = pipeline().run(&connector, &source).await.unwrap();

        assert_eq!(report.summary.malformed, 2);
        assert_eq!(report.summary.persisted, 1);
        match &report.outcomes[0].outcome {
            RowOutcome::Malformed { error, .. } => {
                assert_eq!(error.field, "year");
                assert_eq!(error.value, "MMXX");
                assert_eq!(error.reason, MalformedReason::NotAnInteger);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(report.summary.total(), 3);
    }

    #[tokio::test]
    async fn test_persist_failure_is_per_row() {
        let connector = MemoryConnector::new().fail_insert(MUSTANG, StoreError::Constraint("doors_check".to_string()));
        let source = StaticSource::new(vec![raw(MUSTANG, "2014", "100"), raw(CAMRY, "2018", "200")]);

        let report = pipeline().run(&connector, &source).await.unwrap();

        assert_eq!(report.summary.persist_failed, 1);
        assert_eq!(report.summary.persisted, 1);
        assert_eq!(connector.count_vin(MUSTANG), 0);
    }

    #[tokio::test]
    async fn test_connection_failure_never_reads_source() {
        let connector = MemoryConnector::new().fail_connect();
        let source = CountingSource::new(false);

        let err = pipeline().run(&connector, &source).await.unwrap_err();

        assert_eq!(err.stage(), FatalStage::Connection);
        assert_eq!(err.exit_code(), 1);
        assert_eq!(
            err.stages,
            vec![PipelineStage::Init, PipelineStage::Failed(FatalStage::Connection)]
        );
        assert_eq!(source.calls(), 0);
        assert_eq!(connector.connections_closed(), 0);
    }

    #[tokio::test]
    async fn test_schema_failures_close_connection() {
        let source = CountingSource::new(false);

        let connector = MemoryConnector::new().fail_table_check();
        let err = pipeline().run(&connector, &source).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.stages.last(), Some(&PipelineStage::Failed(FatalStage::SchemaCheck)));
        assert_eq!(connector.connections_closed(), 1);

        let connector = MemoryConnector::new().fail_create();
        let err = pipeline().run(&connector, &source).await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(connector.connections_closed(), 1);

        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fatal() {
        let connector = MemoryConnector::new();
        let source = CountingSource::new(true);

        let err = pipeline().run(&connector, &source).await.unwrap_err();

        assert_eq!(err.stage(), FatalStage::Fetch);
        assert_eq!(err.exit_code(), 4);
        assert_eq!(
            err.stages,
            vec![
                PipelineStage::Init,
                PipelineStage::ConnectionReady,
                PipelineStage::SchemaReady,
                PipelineStage::Failed(FatalStage::Fetch),
            ]
        );

        let json: serde_json::Value = serde_json::from_str(&err.to_json().unwrap()).unwrap();
        assert_eq!(json["failed"], "fetch");
        assert_eq!(json["exit_code"], 4);
        assert_eq!(json["stages"][3]["failed"], "fetch");
        assert_eq!(source.calls(), 1);
        assert_eq!(connector.connections_closed(), 1);
        assert!(connector.records().is_empty());
    }

    #[tokio::test]
    async fn test_close_failure_keeps_outcomes() {
        let connector = MemoryConnector::new().fail_close();
        let source = CountingSource::new(false);

        let report = pipeline().run(&connector, &source).await.unwrap();
        assert_eq!(report.summary.persisted, 1);
        assert_eq!(connector.connections_closed(), 1);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let connector = MemoryConnector::new();
        let report = pipeline().run(&connector, &StaticSource::default()).await.unwrap();
        assert_eq!(report.summary.total(), 0);
        assert!(connector.table_created());
    }

    #[test]
    fn test_setup_failure_halts_before_start() {
        let halted = HaltedRun::before_start(ConfigError::MissingVar("DB_HOST".to_string()));
        assert_eq!(halted.exit_code(), 5);
        assert_eq!(
            halted.stages,
            vec![PipelineStage::Init, PipelineStage::Failed(FatalStage::Setup)]
        );
        assert!(matches!(PipelineError::from(halted), PipelineError::Config(_)));
    }

    #[test]
    fn test_prepare_numbers_rows_from_one() {
        let prepared = pipeline().prepare(&[raw(MUSTANG, "2014", "1"), raw(CAMRY, "MMXX", "2")]);
        assert_eq!(prepared[0].row, 1);
        assert!(prepared[0].mapped.is_ok());
        assert_eq!(prepared[1].row, 2);
        assert!(prepared[1].mapped.is_err());
    }

    #[test]
    fn test_report_serializes() {
        let report = SyncReport {
            source: "test".to_string(),
            table: "vehicle_inventory".to_string(),
            table_status: TableStatus::Existing,
            summary: SyncSummary::default(),
            outcomes: vec![OutcomeRecord {
                row: 1,
                outcome: RowOutcome::DuplicateSkipped { record: record(MUSTANG) },
            }],
            stages: vec![PipelineStage::Init, PipelineStage::Failed(FatalStage::Fetch)],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["outcomes"][0]["outcome"], "duplicate_skipped");
        assert_eq!(json["outcomes"][0]["row"], 1);
        assert_eq!(json["stages"][1]["failed"], "fetch");
    }
}
