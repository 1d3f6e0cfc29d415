//! PostgreSQL inventory store.
//!
//! One `sqlx` connection per run, owned by the pipeline. Each insert gets
//! its own transaction and reports uniqueness violations separately from
//! every other failure.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::error::ErrorKind;
use sqlx::{Connection, PgConnection};

use super::{InventoryStore, StoreConnector};
use crate::error::{ConnError, SchemaError, StoreError, StoreResult};
use crate::logs::log_warning;
use crate::models::InventoryRecord;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern is valid"));

// =============================================================================
// SQL
// =============================================================================

const TABLE_EXISTS_SQL: &str = "SELECT EXISTS (\
     SELECT 1 FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = $1)";

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n\
         \x20   stock_number INTEGER GENERATED ALWAYS AS IDENTITY PRIMARY KEY,\n\
         \x20   vehicle_identification_number VARCHAR(17) NOT NULL UNIQUE,\n\
         \x20   make VARCHAR(32) NOT NULL,\n\
         \x20   model VARCHAR(32) NOT NULL,\n\
         \x20   year SMALLINT NOT NULL,\n\
         \x20   mileage INTEGER NOT NULL,\n\
         \x20   price VARCHAR(32) NOT NULL,\n\
         \x20   condition VARCHAR(32) NOT NULL,\n\
         \x20   color VARCHAR(32) NOT NULL,\n\
         \x20   interior_color VARCHAR(32) NOT NULL,\n\
         \x20   engine VARCHAR(32) NOT NULL,\n\
         \x20   transmission VARCHAR(32) NOT NULL,\n\
         \x20   drive_train VARCHAR(32) NOT NULL,\n\
         \x20   fuel_type VARCHAR(32) NOT NULL,\n\
         \x20   body_style VARCHAR(32) NOT NULL,\n\
         \x20   number_of_seats SMALLINT NOT NULL,\n\
         \x20   doors SMALLINT NOT NULL,\n\
         \x20   notes VARCHAR(256) NULL\n\
         )"
    )
}

fn insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} (\
         vehicle_identification_number, make, model, year, mileage, price, condition, \
         color, interior_color, engine, transmission, drive_train, fuel_type, body_style, \
         number_of_seats, doors, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
         RETURNING stock_number"
    )
}

fn contains_sql(table: &str) -> String {
    format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE vehicle_identification_number = $1)")
}

// =============================================================================
// Error classification
// =============================================================================

/// Sort a driver error into the store's error kinds
pub fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.kind() {
            ErrorKind::UniqueViolation => StoreError::UniqueViolation {
                constraint: db_err.constraint().map(str::to_string),
            },
            ErrorKind::ForeignKeyViolation | ErrorKind::NotNullViolation | ErrorKind::CheckViolation => {
                StoreError::Constraint(db_err.message().to_string())
            }
            _ => StoreError::Query(db_err.message().to_string()),
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Connection(err.to_string()),
        _ => StoreError::Query(err.to_string()),
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Connection settings for a PostgreSQL inventory table
#[derive(Debug, Clone)]
pub struct PgConnector {
    url: String,
    table: String,
}

impl PgConnector {
    /// The table name is interpolated into SQL, so only plain identifiers
    /// are accepted.
    pub fn new(url: impl Into<String>, table: impl Into<String>) -> Result<Self, ConnError> {
        let table = table.into();
        if !IDENTIFIER.is_match(&table) {
            return Err(ConnError::Settings(format!("invalid table name '{table}'")));
        }
        Ok(Self { url: url.into(), table })
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    type Store = PgInventoryStore;

    async fn connect(&self) -> Result<PgInventoryStore, ConnError> {
        let conn = PgConnection::connect(&self.url)
            .await
            .map_err(|e| ConnError::Connect(e.to_string()))?;

        Ok(PgInventoryStore {
            conn,
            table: self.table.clone(),
        })
    }

    fn describe(&self) -> String {
        format!("PostgreSQL table '{}' at {}", self.table, redact_url(&self.url))
    }
}

/// Hide the password in a connection URL
fn redact_url(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("****"));
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<unparsable url>".to_string(),
    }
}

// =============================================================================
// Store
// =============================================================================

/// An open PostgreSQL connection bound to one inventory table
pub struct PgInventoryStore {
    conn: PgConnection,
    table: String,
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    fn table_name(&self) -> &str {
        &self.table
    }

    async fn table_exists(&mut self) -> Result<bool, SchemaError> {
        // Unquoted identifiers are folded to lower case by PostgreSQL
        sqlx::query_scalar::<_, bool>(TABLE_EXISTS_SQL)
            .bind(self.table.to_lowercase())
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| SchemaError::Check {
                table: self.table.clone(),
                message: e.to_string(),
            })
    }

    async fn create_table(&mut self) -> Result<(), SchemaError> {
        let sql = create_table_sql(&self.table);
        sqlx::query(&sql)
            .execute(&mut self.conn)
            .await
            .map_err(|e| SchemaError::Create {
                table: self.table.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn contains(&mut self, vin: &str) -> StoreResult<bool> {
        let sql = contains_sql(&self.table);
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(vin)
            .fetch_one(&mut self.conn)
            .await
            .map_err(classify)
    }

    async fn insert(&mut self, record: &InventoryRecord) -> StoreResult<i32> {
        let sql = insert_sql(&self.table);
        let mut tx = self.conn.begin().await.map_err(classify)?;

        let inserted = sqlx::query_scalar::<_, i32>(&sql)
            .bind(&record.vehicle_identification_number)
            .bind(&record.make)
            .bind(&record.model)
            .bind(record.year)
            .bind(record.mileage)
            .bind(&record.price)
            .bind(&record.condition)
            .bind(&record.color)
            .bind(&record.interior_color)
            .bind(&record.engine)
            .bind(&record.transmission)
            .bind(&record.drive_train)
            .bind(&record.fuel_type)
            .bind(&record.body_style)
            .bind(record.number_of_seats)
            .bind(record.doors)
            .bind(&record.notes)
            .fetch_one(&mut *tx)
            .await;

        match inserted {
            Ok(stock_number) => {
                // Deferred constraints surface here
                tx.commit().await.map_err(classify)?;
                Ok(stock_number)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    log_warning(format!("Rollback failed: {}", rollback));
                }
                Err(classify(e))
            }
        }
    }

    async fn close(self) -> StoreResult<()> {
        self.conn.close().await.map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(PgConnector::new("postgres://localhost/cars", "vehicle_inventory").is_ok());
        assert!(PgConnector::new("postgres://localhost/cars", "_staging2").is_ok());

        for bad in ["", "2cars", "vehicle inventory", "cars; DROP TABLE x", "public.cars"] {
            assert!(
                matches!(PgConnector::new("postgres://localhost/cars", bad), Err(ConnError::Settings(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_create_table_sql_shape() {
        let sql = create_table_sql("vehicle_inventory");
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS vehicle_inventory"));
        assert!(sql.contains("stock_number INTEGER GENERATED ALWAYS AS IDENTITY PRIMARY KEY"));
        assert!(sql.contains("vehicle_identification_number VARCHAR(17) NOT NULL UNIQUE"));
        assert!(sql.contains("notes VARCHAR(256) NULL"));
    }

    #[test]
    fn test_insert_binds_every_field() {
        let sql = insert_sql("vehicle_inventory");
        assert!(sql.contains("$17"));
        assert!(!sql.contains("$18"));
        assert!(sql.ends_with("RETURNING stock_number"));
        assert!(!sql.contains("stock_number,"));
    }

    #[test]
    fn test_classify_non_database_errors() {
        assert!(matches!(classify(sqlx::Error::PoolClosed), StoreError::Connection(_)));
        assert!(matches!(classify(sqlx::Error::RowNotFound), StoreError::Query(_)));
    }

    #[test]
    fn test_describe_hides_password() {
        let connector = PgConnector::new("postgres://sync:hunter2@db:5432/cars", "vehicle_inventory").unwrap();
        let described = connector.describe();
        assert!(!described.contains("hunter2"));
        assert!(described.contains("vehicle_inventory"));
    }
}
