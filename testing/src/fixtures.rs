//! Builders for common test data.

use dispensary_core::prescription::NewPrescription;
use dispensary_core::{EncounterId, MedicineId, NewPrescriptionItem};
use rust_decimal::Decimal;

/// Prescription input with one item per `(medicine, quantity)` pair.
#[must_use]
pub fn new_prescription(items: &[(MedicineId, Decimal)]) -> NewPrescription {
    NewPrescription {
        encounter_id: EncounterId::new(),
        valid_from: None,
        valid_to: None,
        notes: None,
        created_by: None,
        items: items
            .iter()
            .map(|&(medicine_id, quantity)| NewPrescriptionItem::new(medicine_id, quantity))
            .collect(),
    }
}

/// Whole-unit decimal.
#[must_use]
pub fn qty(units: i64) -> Decimal {
    Decimal::from(units)
}

/// Decimal with three fractional digits, e.g. `milli(2500)` is 2.5.
#[must_use]
pub fn milli(thousandths: i64) -> Decimal {
    Decimal::new(thousandths, 3)
}
