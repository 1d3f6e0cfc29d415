//! Error types for the inventory sync pipeline.
//!
//! Errors are split along the line the pipeline cares about:
//!
//! - Fatal errors halt the run before or around persistence:
//!   [`ConfigError`], [`RuleError`], [`ConnError`], [`SchemaError`], [`FetchError`],
//!   all wrapped by [`PipelineError`].
//! - Row-level errors never escape a single row:
//!   [`MalformedFieldError`] from the mapper and [`StoreError`] from the store.
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is not set.
    #[error("Missing environment variable: {0}")]
    MissingVar(String),

    /// A value is present but unusable.
    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

// =============================================================================
// Transform Rule Errors
// =============================================================================

/// Errors while loading or compiling transform rules.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Rule file could not be read.
    #[error("Failed to read rule file: {0}")]
    Io(#[from] std::io::Error),

    /// Rule file is not valid JSON for a rule set.
    #[error("Invalid rule set JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Column key is neither an index below 17 nor a known field name.
    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    /// Regex pattern does not compile.
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Rule would not be idempotent: a replacement re-introduces its pattern,
    /// or a mapped value is itself mapped to something else.
    #[error("Rule is not idempotent: replacing '{from}' with '{to}'")]
    NotIdempotent { from: String, to: String },
}

// =============================================================================
// Source Errors
// =============================================================================

/// Errors while fetching raw rows from the source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Service account credentials are missing or unreadable.
    #[error("Invalid credentials: {0}")]
    Credentials(String),

    /// Token exchange was rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// HTTP request could not be completed.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// Source answered with an error status.
    #[error("Source returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Source answered with a body we cannot read.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Local file could not be read.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Local CSV export is malformed.
    #[error("Invalid CSV: {0}")]
    Csv(String),
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors while opening a store connection.
#[derive(Debug, Error)]
pub enum ConnError {
    /// Connection could not be established.
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// Connection settings are unusable.
    #[error("Invalid connection settings: {0}")]
    Settings(String),
}

/// Errors while preparing the target table.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Existence check failed.
    #[error("Failed to check table '{table}': {message}")]
    Check { table: String, message: String },

    /// Table creation failed.
    #[error("Failed to create table '{table}': {message}")]
    Create { table: String, message: String },
}

/// Errors from a single store operation.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Insert rejected by the uniqueness constraint.
    #[error("Unique constraint violated{}", constraint_suffix(.constraint))]
    UniqueViolation { constraint: Option<String> },

    /// Insert rejected by another constraint (not null, check, foreign key).
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// Statement failed (type mismatch, value too long, ...).
    #[error("Query failed: {0}")]
    Query(String),

    /// Connection was lost or closed.
    #[error("Connection error: {0}")]
    Connection(String),
}

fn constraint_suffix(constraint: &Option<String>) -> String {
    constraint
        .as_deref()
        .map(|name| format!(": {name}"))
        .unwrap_or_default()
}

impl StoreError {
    /// Whether the store rejected the write because the key already exists.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }
}

// =============================================================================
// Mapping Errors
// =============================================================================

/// Why a normalized field could not become a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedReason {
    /// Required field is empty.
    Empty,
    /// Field is not an integer.
    NotAnInteger,
    /// Integer is negative or does not fit the column type.
    OutOfRange,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MalformedReason::Empty => "required value is empty",
            MalformedReason::NotAnInteger => "not an integer",
            MalformedReason::OutOfRange => "out of range",
        };
        f.write_str(text)
    }
}

/// A normalized field that cannot be mapped into an [`crate::InventoryRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("Malformed field '{field}' (value '{value}'): {reason}")]
pub struct MalformedFieldError {
    pub field: &'static str,
    pub value: String,
    pub reason: MalformedReason,
}

impl MalformedFieldError {
    pub fn new(field: &'static str, value: impl Into<String>, reason: MalformedReason) -> Self {
        Self {
            field,
            value: value.into(),
            reason,
        }
    }
}

// =============================================================================
// Pipeline Errors (top-level, fatal)
// =============================================================================

/// Stage at which a run halted. The discriminant is the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalStage {
    Connection = 1,
    SchemaCheck = 2,
    SchemaCreate = 3,
    Fetch = 4,
    Setup = 5,
}

impl FatalStage {
    pub fn exit_code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for FatalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FatalStage::Connection => "connection",
            FatalStage::SchemaCheck => "schema check",
            FatalStage::SchemaCreate => "schema creation",
            FatalStage::Fetch => "fetch",
            FatalStage::Setup => "setup",
        };
        f.write_str(name)
    }
}

/// Errors that halt a sync run.
///
/// Row-level problems are reported through [`crate::RowOutcome`] instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transform rules could not be loaded.
    #[error("Rule error: {0}")]
    Rules(#[from] RuleError),

    /// Store connection could not be opened.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnError),

    /// Target table could not be checked or created.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Source rows could not be fetched.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

impl PipelineError {
    /// Stage the run halted at.
    pub fn stage(&self) -> FatalStage {
        match self {
            PipelineError::Config(_) | PipelineError::Rules(_) => FatalStage::Setup,
            PipelineError::Connection(_) => FatalStage::Connection,
            PipelineError::Schema(SchemaError::Check { .. }) => FatalStage::SchemaCheck,
            PipelineError::Schema(SchemaError::Create { .. }) => FatalStage::SchemaCreate,
            PipelineError::Fetch(_) => FatalStage::Fetch,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.stage().exit_code()
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for source operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
