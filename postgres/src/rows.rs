//! Row ↔ domain mapping.

use dispensary_core::store::StoreError;
use dispensary_core::{
    Dispense, DispenseLine, DispenseStatus, Medicine, Prescription, PrescriptionItem,
    PrescriptionStatus,
};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row};

pub(crate) const MEDICINE_COLUMNS: &str =
    "id, name, generic_name, form, strength, unit, stock, is_active, created_at, updated_at";

pub(crate) const PRESCRIPTION_COLUMNS: &str = "id, encounter_id, status, valid_from, valid_to, \
    notes, created_at, created_by, updated_at, updated_by, canceled_at, canceled_by, \
    canceled_reason";

pub(crate) const ITEM_COLUMNS: &str = "id, prescription_id, medicine_id, quantity_prescribed, \
    unit_prescribed, dose, frequency, duration, notes, created_at, updated_at";

pub(crate) const DISPENSE_COLUMNS: &str = "id, prescription_id, status, dispensed_at, \
    dispensed_by, notes, created_at, created_by, updated_at";

pub(crate) const LINE_COLUMNS: &str =
    "id, dispense_id, prescription_item_id, quantity_dispensed, notes, created_at";

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::CorruptRecord(format!("column {name}: {e}")))
}

fn actor(row: &PgRow, name: &str) -> Result<Option<dispensary_core::ActorId>, StoreError> {
    Ok(col::<Option<uuid::Uuid>>(row, name)?.map(Into::into))
}

pub(crate) fn medicine(row: &PgRow) -> Result<Medicine, StoreError> {
    Ok(Medicine {
        id: col::<uuid::Uuid>(row, "id")?.into(),
        name: col(row, "name")?,
        generic_name: col(row, "generic_name")?,
        form: col(row, "form")?,
        strength: col(row, "strength")?,
        unit: col(row, "unit")?,
        stock: col(row, "stock")?,
        is_active: col(row, "is_active")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

pub(crate) fn prescription(row: &PgRow) -> Result<Prescription, StoreError> {
    let status: String = col(row, "status")?;
    Ok(Prescription {
        id: col::<uuid::Uuid>(row, "id")?.into(),
        encounter_id: col::<uuid::Uuid>(row, "encounter_id")?.into(),
        status: PrescriptionStatus::parse(&status)?,
        valid_from: col(row, "valid_from")?,
        valid_to: col(row, "valid_to")?,
        notes: col(row, "notes")?,
        created_at: col(row, "created_at")?,
        created_by: actor(row, "created_by")?,
        updated_at: col(row, "updated_at")?,
        updated_by: actor(row, "updated_by")?,
        canceled_at: col(row, "canceled_at")?,
        canceled_by: actor(row, "canceled_by")?,
        canceled_reason: col(row, "canceled_reason")?,
    })
}

pub(crate) fn item(row: &PgRow) -> Result<PrescriptionItem, StoreError> {
    Ok(PrescriptionItem {
        id: col::<uuid::Uuid>(row, "id")?.into(),
        prescription_id: col::<uuid::Uuid>(row, "prescription_id")?.into(),
        medicine_id: col::<uuid::Uuid>(row, "medicine_id")?.into(),
        quantity_prescribed: col(row, "quantity_prescribed")?,
        unit_prescribed: col(row, "unit_prescribed")?,
        dose: col(row, "dose")?,
        frequency: col(row, "frequency")?,
        duration: col(row, "duration")?,
        notes: col(row, "notes")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

pub(crate) fn dispense(row: &PgRow) -> Result<Dispense, StoreError> {
    let status: String = col(row, "status")?;
    Ok(Dispense {
        id: col::<uuid::Uuid>(row, "id")?.into(),
        prescription_id: col::<uuid::Uuid>(row, "prescription_id")?.into(),
        status: DispenseStatus::parse(&status)?,
        dispensed_at: col(row, "dispensed_at")?,
        dispensed_by: actor(row, "dispensed_by")?,
        notes: col(row, "notes")?,
        created_at: col(row, "created_at")?,
        created_by: actor(row, "created_by")?,
        updated_at: col(row, "updated_at")?,
    })
}

pub(crate) fn line(row: &PgRow) -> Result<DispenseLine, StoreError> {
    Ok(DispenseLine {
        id: col::<uuid::Uuid>(row, "id")?.into(),
        dispense_id: col::<uuid::Uuid>(row, "dispense_id")?.into(),
        prescription_item_id: col::<uuid::Uuid>(row, "prescription_item_id")?.into(),
        quantity_dispensed: col(row, "quantity_dispensed")?,
        notes: col(row, "notes")?,
        created_at: col(row, "created_at")?,
    })
}
