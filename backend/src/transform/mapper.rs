//! Record mapper
//!
//! Positional conversion of a [`NormalizedRow`] into an [`InventoryRecord`].

use std::num::IntErrorKind;
use std::str::FromStr;

use crate::error::{MalformedFieldError, MalformedReason};
use crate::models::{InventoryColumn, InventoryRecord, NormalizedRow};

/// Build a typed record from a normalized row.
///
/// Required text fields must be non-empty; `year`, `mileage`,
/// `number_of_seats` and `doors` must be non-negative integers that fit their
/// column. The first offending field is reported.
pub fn map_record(row: &NormalizedRow) -> Result<InventoryRecord, MalformedFieldError> {
    use InventoryColumn as C;

    let text = |column: C| required_text(row, column);

    Ok(InventoryRecord {
        vehicle_identification_number: text(C::VehicleIdentificationNumber)?,
        make: text(C::Make)?,
        model: text(C::Model)?,
        year: integer(row, C::Year)?,
        mileage: integer(row, C::Mileage)?,
        price: text(C::Price)?,
        condition: text(C::Condition)?,
        color: text(C::Color)?,
        interior_color: text(C::InteriorColor)?,
        engine: text(C::Engine)?,
        transmission: text(C::Transmission)?,
        drive_train: text(C::DriveTrain)?,
        fuel_type: text(C::FuelType)?,
        body_style: text(C::BodyStyle)?,
        number_of_seats: integer(row, C::NumberOfSeats)?,
        doors: integer(row, C::Doors)?,
        notes: optional_text(row, C::Notes),
    })
}

fn required_text(row: &NormalizedRow, column: InventoryColumn) -> Result<String, MalformedFieldError> {
    let value = row.get(column);
    if value.trim().is_empty() {
        return Err(MalformedFieldError::new(column.name(), value, MalformedReason::Empty));
    }
    Ok(value.to_string())
}

fn optional_text(row: &NormalizedRow, column: InventoryColumn) -> Option<String> {
    let value = row.get(column);
    (!value.trim().is_empty()).then(|| value.to_string())
}

fn integer<T>(row: &NormalizedRow, column: InventoryColumn) -> Result<T, MalformedFieldError>
where
    T: FromStr<Err = std::num::ParseIntError> + PartialOrd + Default,
{
    let value = row.get(column);
    let malformed = |reason| MalformedFieldError::new(column.name(), value, reason);

    if value.is_empty() {
        return Err(malformed(MalformedReason::Empty));
    }

    let parsed = value.parse::<T>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => malformed(MalformedReason::OutOfRange),
        _ => malformed(MalformedReason::NotAnInteger),
    })?;

    if parsed < T::default() {
        return Err(malformed(MalformedReason::OutOfRange));
    }
    Ok(parsed)
}
