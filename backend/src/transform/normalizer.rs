//! Row normalizer
//!
//! Brings a ragged raw row to exactly [`COLUMN_COUNT`] cells and runs every
//! cell through the [`TransformChain`].

use super::chain::TransformChain;
use crate::models::{NormalizedRow, COLUMN_COUNT};

/// Fixed-width row normalizer with an injected rule chain
#[derive(Debug, Clone, Default)]
pub struct RowNormalizer {
    chain: TransformChain,
}

impl RowNormalizer {
    pub fn new(chain: TransformChain) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &TransformChain {
        &self.chain
    }

    /// Pad or truncate to 17 cells, then apply the chain per column.
    ///
    /// Missing cells become `""` before transformation, so catch-all rules
    /// still see them. Cells past the last column are dropped.
    pub fn normalize(&self, raw: &[String]) -> NormalizedRow {
        let cells: [String; COLUMN_COUNT] = std::array::from_fn(|i| {
            let cell = raw.get(i).map(String::as_str).unwrap_or("");
            self.chain.apply(i, cell)
        });
        NormalizedRow::new(cells)
    }
}
