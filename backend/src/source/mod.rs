//! Row sources.
//!
//! A source hands the pipeline every raw row of the inventory in one batch:
//!
//! - [`sheets`] - Google Sheets `values.get` with a service account
//! - [`csv`] - A local CSV export of the same sheet
//! - [`StaticSource`] - Rows held in memory (previews and tests)

pub mod csv;
pub mod sheets;

use async_trait::async_trait;

use crate::error::FetchResult;
use crate::models::RawRow;

pub use self::csv::CsvFileSource;
pub use sheets::{ServiceAccountKey, SheetsSource};

/// Provides the raw rows of one sync run.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Fetch every row, in source order
    async fn fetch_rows(&self) -> FetchResult<Vec<RawRow>>;

    /// Where the rows come from, for logs
    fn describe(&self) -> String;
}

/// A fixed set of rows
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    rows: Vec<RawRow>,
}

impl StaticSource {
    pub fn new(rows: Vec<RawRow>) -> Self {
        Self { rows }
    }

    /// Build from string slices, one slice per row
    pub fn from_cells(rows: &[&[&str]]) -> Self {
        Self::new(
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }
}

#[async_trait]
impl RowSource for StaticSource {
    async fn fetch_rows(&self) -> FetchResult<Vec<RawRow>> {
        Ok(self.rows.clone())
    }

    fn describe(&self) -> String {
        format!("{} in-memory rows", self.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_keeps_order() {
        let source = StaticSource::from_cells(&[&["A", "Ford"], &["B"]]);
        let rows = source.fetch_rows().await.unwrap();
        assert_eq!(rows, vec![vec!["A".to_string(), "Ford".to_string()], vec!["B".to_string()]]);
        assert_eq!(source.describe(), "2 in-memory rows");
    }
}
