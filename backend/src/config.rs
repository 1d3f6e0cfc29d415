//! Runtime configuration from the environment.
//!
//! Values are read from process environment variables, after loading a
//! `.env` file when one is present. Database and sheet settings are loaded
//! separately so that a run only requires what it actually uses.

use std::env;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::store::DEFAULT_TABLE;

/// Default location of the service-account key
pub const DEFAULT_CREDENTIALS_FILE: &str = "./credentials.json";

const DEFAULT_DB_PORT: u16 = 5432;

/// Load `.env` into the process environment, if present
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Read an environment variable through a lookup function.
///
/// Empty values count as unset.
fn lookup<F>(get: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn require<F>(get: &F, name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(get, name).ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

/// Like [`require`], but the value is kept byte-for-byte
fn require_secret<F>(get: &F, name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    get(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn from_process_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

// =============================================================================
// Database
// =============================================================================

/// Where the inventory table lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub table: String,
}

impl DatabaseConfig {
    /// `DATABASE_URL`, or `DB_HOST`/`DB_CONTEXT`/`DB_USER`/`DB_PASSWORD`
    /// (+ `DB_PORT`); table from `DB_TABLE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(from_process_env)
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let table = lookup(&get, "DB_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());

        if let Some(url) = lookup(&get, "DATABASE_URL") {
            return Ok(Self { url, table });
        }

        let host = require(&get, "DB_HOST")?;
        let database = require(&get, "DB_CONTEXT")?;
        let user = require(&get, "DB_USER")?;
        let password = require_secret(&get, "DB_PASSWORD")?;
        let port = match lookup(&get, "DB_PORT") {
            Some(port) => port.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                name: "DB_PORT".to_string(),
                message: e.to_string(),
            })?,
            None => DEFAULT_DB_PORT,
        };

        Ok(Self {
            url: build_postgres_url(&host, port, &database, &user, &password)?,
            table,
        })
    }
}

fn build_postgres_url(host: &str, port: u16, database: &str, user: &str, password: &str) -> Result<String, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        name: "DB_HOST".to_string(),
        message,
    };

    let mut url = reqwest::Url::parse(&format!("postgres://{}:{}", host, port)).map_err(|e| invalid(e.to_string()))?;
    // Credentials are percent-encoded by the setters
    url.set_username(user)
        .map_err(|_| invalid("host does not accept credentials".to_string()))?;
    url.set_password(Some(password))
        .map_err(|_| invalid("host does not accept credentials".to_string()))?;
    url.set_path(&format!("/{}", database));

    Ok(url.to_string())
}

// =============================================================================
// Sheet
// =============================================================================

/// Which spreadsheet range to read, and with which key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetConfig {
    pub spreadsheet_id: String,
    pub range: String,
    pub credentials_file: PathBuf,
}

impl SheetConfig {
    /// `GOOGLE_SHEET_ID`, `GOOGLE_SHEET_RANGE`, `GOOGLE_SERVICE_ACCOUNT_FILE`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(from_process_env)
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            spreadsheet_id: require(&get, "GOOGLE_SHEET_ID")?,
            range: require(&get, "GOOGLE_SHEET_RANGE")?,
            credentials_file: lookup(&get, "GOOGLE_SERVICE_ACCOUNT_FILE")
                .unwrap_or_else(|| DEFAULT_CREDENTIALS_FILE.to_string())
                .into(),
        })
    }
}

/// Optional transform rule file from `INVENTORY_RULES_FILE`
pub fn rules_file_from_env() -> Option<PathBuf> {
    lookup(&from_process_env, "INVENTORY_RULES_FILE").map(PathBuf::from)
}
