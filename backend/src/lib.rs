//! # Inventory Sync - Spreadsheet to relational vehicle inventory
//!
//! Inventory Sync reads the rows of a vehicle inventory spreadsheet, cleans
//! every cell with configurable transform rules, maps each row to a typed
//! record and stores it in a relational table without ever creating a
//! second record for the same VIN.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Row Source  │────▶│ Normalizer  │────▶│   Mapper    │────▶│  Persister  │
//! │ (Sheet/CSV) │     │ (17 cells)  │     │  (typed)    │     │ (unique VIN)│
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use inventory_sync::{CsvFileSource, PgConnector, SyncPipeline, TransformChain};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = SyncPipeline::new(TransformChain::inventory_defaults());
//!     let connector = PgConnector::new("postgres://localhost/cars", "vehicle_inventory").unwrap();
//!     let report = pipeline.run(&connector, &CsvFileSource::new("inventory.csv")).await.unwrap();
//!     println!("{}", report.summary);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types and fatal stages
//! - [`models`] - Columns, rows and records
//! - [`transform`] - Rules, chain, normalizer, mapper
//! - [`source`] - Google Sheets and CSV sources
//! - [`store`] - PostgreSQL and in-memory stores
//! - [`sync`] - Persister, pipeline and report
//! - [`config`] - Environment configuration
//! - [`logs`] - Run log broadcasting

// Core modules
pub mod error;
pub mod models;

// Configuration and logging
pub mod config;
pub mod logs;

// Transformation
pub mod transform;

// Collaborators
pub mod source;
pub mod store;

// Orchestration
pub mod sync;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    ConnError,
    FatalStage,
    FetchError,
    MalformedFieldError,
    MalformedReason,
    PipelineError,
    RuleError,
    SchemaError,
    StoreError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    InventoryColumn,
    InventoryRecord,
    NormalizedRow,
    PersistedRecord,
    RawRow,
    COLUMN_COUNT,
};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    default_rule_set,
    map_record,
    rules_description,
    RowNormalizer,
    RuleSetConfig,
    RuleSpec,
    TransformChain,
    TransformRule,
};

// =============================================================================
// Re-exports - Sources
// =============================================================================

pub use source::{CsvFileSource, RowSource, ServiceAccountKey, SheetsSource, StaticSource};

// =============================================================================
// Re-exports - Stores
// =============================================================================

pub use store::{
    ensure_table,
    InventoryStore,
    MemoryConnector,
    PgConnector,
    StoreConnector,
    TableStatus,
};

// =============================================================================
// Re-exports - Sync
// =============================================================================

pub use sync::{
    HaltedRun,
    OutcomeKind,
    PersistOutcome,
    Persister,
    PipelineStage,
    RowOutcome,
    SyncPipeline,
    SyncReport,
    SyncSummary,
};
