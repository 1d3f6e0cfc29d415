//! In-memory inventory store.
//!
//! Behaves like the relational table (identity stock numbers, unique VIN)
//! and can be told to fail at any stage. The connector and every store it
//! opens share one state, so a caller can inspect the table after a run.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{InventoryStore, StoreConnector, DEFAULT_TABLE};
use crate::error::{ConnError, SchemaError, StoreError, StoreResult};
use crate::models::{InventoryRecord, PersistedRecord};

#[derive(Debug, Default)]
struct MemoryState {
    table_created: bool,
    rows: Vec<PersistedRecord>,
    next_stock_number: i32,
    connections_closed: usize,
    failures: Failures,
}

#[derive(Debug, Default)]
struct Failures {
    connect: bool,
    table_check: bool,
    create: bool,
    contains: bool,
    close: bool,
    /// `contains` always answers "absent", as if another writer raced us
    stale_contains: bool,
    insert: HashMap<String, StoreError>,
}

impl MemoryState {
    fn insert(&mut self, table: &str, record: &InventoryRecord) -> StoreResult<i32> {
        if let Some(err) = self.failures.insert.get(record.vin()) {
            return Err(err.clone());
        }
        if self.rows.iter().any(|r| r.record.vin() == record.vin()) {
            return Err(StoreError::UniqueViolation {
                constraint: Some(format!("{table}_vehicle_identification_number_key")),
            });
        }

        self.next_stock_number += 1;
        self.rows.push(PersistedRecord {
            stock_number: self.next_stock_number,
            record: record.clone(),
        });
        Ok(self.next_stock_number)
    }
}

/// Hands out [`MemoryStore`] connections over one shared table
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    table: String,
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::with_table(DEFAULT_TABLE)
    }

    pub fn with_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// Start with the table present and these records already stored
    pub fn seeded(self, records: impl IntoIterator<Item = InventoryRecord>) -> Self {
        {
            let mut state = self.lock();
            state.table_created = true;
            for record in records {
                // Seeds with repeated VINs keep the first one
                let _ = state.insert(&self.table, &record);
            }
        }
        self
    }

    pub fn fail_connect(self) -> Self {
        self.lock().failures.connect = true;
        self
    }

    pub fn fail_table_check(self) -> Self {
        self.lock().failures.table_check = true;
        self
    }

    pub fn fail_create(self) -> Self {
        self.lock().failures.create = true;
        self
    }

    pub fn fail_contains(self) -> Self {
        self.lock().failures.contains = true;
        self
    }

    pub fn fail_close(self) -> Self {
        self.lock().failures.close = true;
        self
    }

    pub fn stale_contains(self) -> Self {
        self.lock().failures.stale_contains = true;
        self
    }

    /// Make the insert of one VIN fail with the given error
    pub fn fail_insert(self, vin: impl Into<String>, err: StoreError) -> Self {
        self.lock().failures.insert.insert(vin.into(), err);
        self
    }

    pub fn records(&self) -> Vec<PersistedRecord> {
        self.lock().rows.clone()
    }

    pub fn count_vin(&self, vin: &str) -> usize {
        self.lock().rows.iter().filter(|r| r.record.vin() == vin).count()
    }

    pub fn table_created(&self) -> bool {
        self.lock().table_created
    }

    pub fn connections_closed(&self) -> usize {
        self.lock().connections_closed
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    // Ignore poisoning
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    type Store = MemoryStore;

    async fn connect(&self) -> Result<MemoryStore, ConnError> {
        if self.lock().failures.connect {
            return Err(ConnError::Connect("in-memory store refused the connection".to_string()));
        }
        Ok(MemoryStore {
            table: self.table.clone(),
            state: Arc::clone(&self.state),
        })
    }

    fn describe(&self) -> String {
        format!("in-memory table '{}'", self.table)
    }
}

/// One open connection to the in-memory table
#[derive(Debug)]
pub struct MemoryStore {
    table: String,
    state: Arc<Mutex<MemoryState>>,
}

#[async_trait]
impl InventoryStore for MemoryStore {
    fn table_name(&self) -> &str {
        &self.table
    }

    async fn table_exists(&mut self) -> Result<bool, SchemaError> {
        let state = lock(&self.state);
        if state.failures.table_check {
            return Err(SchemaError::Check {
                table: self.table.clone(),
                message: "catalog unavailable".to_string(),
            });
        }
        Ok(state.table_created)
    }

    async fn create_table(&mut self) -> Result<(), SchemaError> {
        let mut state = lock(&self.state);
        if state.failures.create {
            return Err(SchemaError::Create {
                table: self.table.clone(),
                message: "permission denied".to_string(),
            });
        }
        state.table_created = true;
        Ok(())
    }

    async fn contains(&mut self, vin: &str) -> StoreResult<bool> {
        let state = lock(&self.state);
        if state.failures.contains {
            return Err(StoreError::Query("lookup failed".to_string()));
        }
        if state.failures.stale_contains {
            return Ok(false);
        }
        Ok(state.rows.iter().any(|r| r.record.vin() == vin))
    }

    async fn insert(&mut self, record: &InventoryRecord) -> StoreResult<i32> {
        let mut state = lock(&self.state);
        if !state.table_created {
            return Err(StoreError::Query(format!("relation \"{}\" does not exist", self.table)));
        }
        state.insert(&self.table, record)
    }

    async fn close(self) -> StoreResult<()> {
        let mut state = lock(&self.state);
        state.connections_closed += 1;
        if state.failures.close {
            return Err(StoreError::Connection("connection reset while closing".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(vin: &str) -> InventoryRecord {
        InventoryRecord {
            vehicle_identification_number: vin.to_string(),
            make: "Ford".to_string(),
            model: "Mustang".to_string(),
            year: 2014,
            mileage: 12345,
            price: "$18,995.00".to_string(),
            condition: "Used".to_string(),
            color: "Race Red".to_string(),
            interior_color: "Charcoal Black".to_string(),
            engine: "2.3L I4".to_string(),
            transmission: "Automatic".to_string(),
            drive_train: "RWD".to_string(),
            fuel_type: "Gasoline".to_string(),
            body_style: "Coupe".to_string(),
            number_of_seats: 4,
            doors: 2,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_stock_numbers_are_sequential() {
        let connector = MemoryConnector::new().seeded(Vec::new());
        let mut store = connector.connect().await.unwrap();

        assert_eq!(store.insert(&record("VIN1")).await.unwrap(), 1);
        assert_eq!(store.insert(&record("VIN2")).await.unwrap(), 2);
        assert!(store.contains("VIN2").await.unwrap());
        assert!(!store.contains("VIN3").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_vin_is_unique_violation() {
        let connector = MemoryConnector::new().seeded([record("1FA6P8TH5E5000001")]);
        let mut store = connector.connect().await.unwrap();

        let err = store.insert(&record("1FA6P8TH5E5000001")).await.unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(connector.count_vin("1FA6P8TH5E5000001"), 1);
    }

    #[tokio::test]
    async fn test_insert_without_table_fails() {
        let connector = MemoryConnector::new();
        let mut store = connector.connect().await.unwrap();

        let err = store.insert(&record("VIN1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
        assert!(connector.records().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        assert!(MemoryConnector::new().fail_connect().connect().await.is_err());

        let connector = MemoryConnector::new()
            .seeded([record("VIN1")])
            .stale_contains()
            .fail_insert("VIN2", StoreError::Constraint("doors_check".into()))
            .fail_close();
        let mut store = connector.connect().await.unwrap();

        // Stale lookup hides the stored row, the constraint still holds
        assert!(!store.contains("VIN1").await.unwrap());
        assert!(store.insert(&record("VIN1")).await.unwrap_err().is_unique_violation());
        assert!(matches!(
            store.insert(&record("VIN2")).await,
            Err(StoreError::Constraint(_))
        ));

        assert!(store.close().await.is_err());
        assert_eq!(connector.connections_closed(), 1);
    }
}
