//! Relational store collaborators.
//!
//! The pipeline only talks to a store through [`StoreConnector`] and
//! [`InventoryStore`]:
//!
//! - [`postgres`] - PostgreSQL through a single `sqlx` connection
//! - [`memory`] - In-process table used by dry runs and tests

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ConnError, SchemaError, StoreResult};
use crate::models::InventoryRecord;

pub use memory::{MemoryConnector, MemoryStore};
pub use postgres::{PgConnector, PgInventoryStore};

/// Default target table
pub const DEFAULT_TABLE: &str = "vehicle_inventory";

/// Opens the connection a run works on.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Store: InventoryStore;

    async fn connect(&self) -> Result<Self::Store, ConnError>;

    /// Where the connection goes, for logs
    fn describe(&self) -> String;
}

/// An open connection to the inventory table.
///
/// Every insert runs in its own transaction: it is either committed or
/// rolled back before the call returns.
#[async_trait]
pub trait InventoryStore: Send + Sized {
    fn table_name(&self) -> &str;

    async fn table_exists(&mut self) -> Result<bool, SchemaError>;

    async fn create_table(&mut self) -> Result<(), SchemaError>;

    /// Advisory lookup by identification number. The uniqueness constraint
    /// checked by [`InventoryStore::insert`] is what actually decides.
    async fn contains(&mut self, vin: &str) -> StoreResult<bool>;

    /// Insert and commit one record, returning its stock number.
    async fn insert(&mut self, record: &InventoryRecord) -> StoreResult<i32>;

    async fn close(self) -> StoreResult<()>;
}

/// How the table was made ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Existing,
    Created,
}

/// Create the table if the store does not have it yet
pub async fn ensure_table<S: InventoryStore>(store: &mut S) -> Result<TableStatus, SchemaError> {
    if store.table_exists().await? {
        return Ok(TableStatus::Existing);
    }
    store.create_table().await?;
    Ok(TableStatus::Created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_table_creates_once() {
        let connector = MemoryConnector::new();
        let mut store = connector.connect().await.unwrap();

        assert_eq!(ensure_table(&mut store).await.unwrap(), TableStatus::Created);
        assert_eq!(ensure_table(&mut store).await.unwrap(), TableStatus::Existing);
        assert!(connector.table_created());
    }

    #[tokio::test]
    async fn test_ensure_table_reports_check_failure() {
        let connector = MemoryConnector::new().fail_table_check();
        let mut store = connector.connect().await.unwrap();

        let err = ensure_table(&mut store).await.unwrap_err();
        assert!(matches!(err, SchemaError::Check { .. }));
        assert!(!connector.table_created());
    }
}
