//! Google Sheets source.
//!
//! Authenticates with a service-account key (signed JWT exchanged for an
//! access token) and reads one range with the Sheets v4 `values.get` call.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use inventory_sync::source::{RowSource, ServiceAccountKey, SheetsSource};
//!
//! let key = ServiceAccountKey::from_file("credentials.json")?;
//! let source = SheetsSource::new(key, "1AbC...", "Inventory!A2:Q");
//! let rows = source.fetch_rows().await?;
//! ```

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use super::RowSource;
use crate::error::{FetchError, FetchResult};
use crate::logs::{log_info_indent, log_warning_indent};
use crate::models::RawRow;

/// Read-only access to spreadsheets
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of the signed assertion, in seconds
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Default number of attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay between attempts in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

// =============================================================================
// Credentials
// =============================================================================

/// The fields of a service-account key file this source needs
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> FetchResult<Self> {
        serde_json::from_str(json).map_err(|e| FetchError::Credentials(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> FetchResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| FetchError::Credentials(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

// =============================================================================
// API payloads
// =============================================================================

#[derive(Debug, Deserialize)]
struct ValueRange {
    /// Absent when the range holds no data
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Text of one cell; numbers and booleans are rendered as JSON text
pub fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn rows_from_values(values: Vec<Vec<Value>>) -> Vec<RawRow> {
    values
        .iter()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect()
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<GoogleError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(500).collect())
}

/// Worth another attempt: transport failures, throttling and server errors
fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Request(_) => true,
        FetchError::Status { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

// =============================================================================
// Source
// =============================================================================

/// Reads one range of a spreadsheet
#[derive(Clone)]
pub struct SheetsSource {
    client: reqwest::Client,
    key: ServiceAccountKey,
    spreadsheet_id: String,
    range: String,
    api_base: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl SheetsSource {
    pub fn new(key: ServiceAccountKey, spreadsheet_id: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            key,
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
            api_base: SHEETS_API_BASE.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }

    /// Point at another API host (e.g. a local emulator)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_retries(mut self, max_retries: u32, delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = delay;
        self
    }

    /// RS256 assertion for the token endpoint
    fn sign_assertion(&self, now: i64) -> FetchResult<String> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| FetchError::Credentials(format!("private key: {}", e)))?;

        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| FetchError::Credentials(format!("signing failed: {}", e)))
    }

    async fn access_token(&self) -> FetchResult<String> {
        let assertion = self.sign_assertion(chrono::Utc::now().timestamp())?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if status.is_server_error() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: body,
            });
        }
        if !status.is_success() {
            return Err(FetchError::Auth(format!("HTTP {}: {}", status, body)));
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Auth(format!("bad token response: {}", e)))?;
        Ok(token.access_token)
    }

    fn values_url(&self) -> FetchResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.api_base)
            .map_err(|e| FetchError::Request(format!("invalid API base '{}': {}", self.api_base, e)))?;

        url.path_segments_mut()
            .map_err(|_| FetchError::Request(format!("invalid API base '{}'", self.api_base)))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", self.range.as_str()]);

        Ok(url)
    }

    /// Single attempt: token, then the values call
    async fn try_fetch(&self) -> FetchResult<Vec<RawRow>> {
        let token = self.access_token().await?;
        let url = self.values_url()?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let range: ValueRange =
            serde_json::from_str(&body).map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
        Ok(rows_from_values(range.values))
    }
}

#[async_trait]
impl RowSource for SheetsSource {
    async fn fetch_rows(&self) -> FetchResult<Vec<RawRow>> {
        let mut attempt = 1;
        loop {
            match self.try_fetch().await {
                Ok(rows) => return Ok(rows),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    log_warning_indent(format!("Attempt {}/{} failed: {}", attempt, self.max_retries, e), 1);
                    log_info_indent(format!("↻ Retrying in {}ms...", self.retry_delay.as_millis()), 1);
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn describe(&self) -> String {
        format!("Google Sheet {} ({})", self.spreadsheet_id, self.range)
    }
}
