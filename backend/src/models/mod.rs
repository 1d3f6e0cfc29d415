//! Domain models for the inventory sync pipeline.
//!
//! - [`InventoryColumn`] - The 17 source columns in declared order
//! - [`RawRow`] - Cells as fetched from the source
//! - [`NormalizedRow`] - Exactly 17 normalized cells
//! - [`InventoryRecord`] - One typed vehicle listing
//! - [`PersistedRecord`] - A record plus its store-assigned stock number

use serde::{Deserialize, Serialize};

/// Number of columns every source row is normalized to.
pub const COLUMN_COUNT: usize = 17;

/// One row of raw cells from the source, any length.
pub type RawRow = Vec<String>;

// =============================================================================
// Columns
// =============================================================================

/// Source columns, in the order the spreadsheet lays them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryColumn {
    VehicleIdentificationNumber,
    Make,
    Model,
    Year,
    Mileage,
    Price,
    Condition,
    Color,
    InteriorColor,
    Engine,
    Transmission,
    DriveTrain,
    FuelType,
    BodyStyle,
    NumberOfSeats,
    Doors,
    Notes,
}

impl InventoryColumn {
    /// All columns in positional order.
    pub const ALL: [InventoryColumn; COLUMN_COUNT] = [
        Self::VehicleIdentificationNumber,
        Self::Make,
        Self::Model,
        Self::Year,
        Self::Mileage,
        Self::Price,
        Self::Condition,
        Self::Color,
        Self::InteriorColor,
        Self::Engine,
        Self::Transmission,
        Self::DriveTrain,
        Self::FuelType,
        Self::BodyStyle,
        Self::NumberOfSeats,
        Self::Doors,
        Self::Notes,
    ];

    /// Zero-based position in a row.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Field name, as used by the table and in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::VehicleIdentificationNumber => "vehicle_identification_number",
            Self::Make => "make",
            Self::Model => "model",
            Self::Year => "year",
            Self::Mileage => "mileage",
            Self::Price => "price",
            Self::Condition => "condition",
            Self::Color => "color",
            Self::InteriorColor => "interior_color",
            Self::Engine => "engine",
            Self::Transmission => "transmission",
            Self::DriveTrain => "drive_train",
            Self::FuelType => "fuel_type",
            Self::BodyStyle => "body_style",
            Self::NumberOfSeats => "number_of_seats",
            Self::Doors => "doors",
            Self::Notes => "notes",
        }
    }

    /// Look up a column by field name (case-insensitive) or by its index.
    pub fn parse_key(key: &str) -> Option<Self> {
        let key = key.trim();
        if let Ok(index) = key.parse::<usize>() {
            return Self::from_index(index);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(key))
    }
}

// =============================================================================
// Rows
// =============================================================================

/// A row after normalization: always exactly [`COLUMN_COUNT`] cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRow([String; COLUMN_COUNT]);

impl NormalizedRow {
    pub fn new(cells: [String; COLUMN_COUNT]) -> Self {
        Self(cells)
    }

    pub fn get(&self, column: InventoryColumn) -> &str {
        &self.0[column.index()]
    }

    pub fn cells(&self) -> &[String; COLUMN_COUNT] {
        &self.0
    }
}

// =============================================================================
// Records
// =============================================================================

/// One vehicle listing, typed and ready to persist.
///
/// Built once per source row by the mapper and never mutated afterwards.
/// The store-assigned stock number lives on [`PersistedRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub vehicle_identification_number: String,
    pub make: String,
    pub model: String,
    pub year: i16,
    pub mileage: i32,
    pub price: String,
    pub condition: String,
    pub color: String,
    pub interior_color: String,
    pub engine: String,
    pub transmission: String,
    pub drive_train: String,
    pub fuel_type: String,
    pub body_style: String,
    pub number_of_seats: i16,
    pub doors: i16,
    pub notes: Option<String>,
}

impl InventoryRecord {
    /// The uniqueness key.
    pub fn vin(&self) -> &str {
        &self.vehicle_identification_number
    }
}

/// A record that made it into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedRecord {
    pub stock_number: i32,
    pub record: InventoryRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_order_matches_index() {
        for (i, column) in InventoryColumn::ALL.iter().enumerate() {
            assert_eq!(column.index(), i);
            assert_eq!(InventoryColumn::from_index(i), Some(*column));
        }
        assert_eq!(InventoryColumn::from_index(COLUMN_COUNT), None);
        assert_eq!(InventoryColumn::Notes.index(), 16);
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(InventoryColumn::parse_key("4"), Some(InventoryColumn::Mileage));
        assert_eq!(InventoryColumn::parse_key("Drive_Train"), Some(InventoryColumn::DriveTrain));
        assert_eq!(InventoryColumn::parse_key("17"), None);
        assert_eq!(InventoryColumn::parse_key("wheels"), None);
    }
}
