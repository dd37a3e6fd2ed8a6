//! Persistence seam.
//!
//! Every dispensary operation runs inside one [`UnitOfWork`]. Reads and writes
//! made through it become visible to other units only after
//! [`UnitOfWork::commit`]; dropping a unit without committing discards them.
//!
//! # Locking
//!
//! The `lock_*` methods take an exclusive row lock held until the unit ends.
//! Callers acquire locks in a fixed order so concurrent units never deadlock:
//!
//! 1. the dispense row
//! 2. the prescription row
//! 3. medicine rows, in ascending [`MedicineId`] order

use crate::types::{
    Dispense, DispenseId, DispenseLine, Medicine, MedicineId, Prescription, PrescriptionId,
    PrescriptionItem, PrescriptionItemId,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Database operation failed
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored row could not be mapped back to the domain
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// A write violated a storage constraint (foreign key, check, uniqueness)
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The unit of work was already committed or rolled back
    #[error("Unit of work already finished")]
    Finished,
}

/// Factory for units of work.
#[async_trait]
pub trait DispensaryStore: Send + Sync {
    /// Open a new unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if no connection or transaction
    /// can be obtained.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// A transactional view of the dispensary data.
///
/// Reads without a `lock_` prefix see committed data plus this unit's own
/// writes and take no lock.
#[async_trait]
pub trait UnitOfWork: Send {
    // ------------------------------------------------------------------
    // Medicines
    // ------------------------------------------------------------------

    /// Read a medicine.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn medicine(&mut self, id: MedicineId) -> Result<Option<Medicine>, StoreError>;

    /// Read a medicine and hold its row lock until the unit ends.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn lock_medicine(&mut self, id: MedicineId) -> Result<Option<Medicine>, StoreError>;

    /// Insert a new medicine.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn insert_medicine(&mut self, medicine: &Medicine) -> Result<(), StoreError>;

    /// Overwrite the stock of a medicine. Callers must hold its row lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConstraintViolation`] if `stock` is negative.
    async fn set_medicine_stock(
        &mut self,
        id: MedicineId,
        stock: Decimal,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Prescriptions
    // ------------------------------------------------------------------

    /// Read a prescription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn prescription(&mut self, id: PrescriptionId)
    -> Result<Option<Prescription>, StoreError>;

    /// Read a prescription and hold its row lock until the unit ends.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn lock_prescription(
        &mut self,
        id: PrescriptionId,
    ) -> Result<Option<Prescription>, StoreError>;

    /// Insert a new prescription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn insert_prescription(&mut self, prescription: &Prescription)
    -> Result<(), StoreError>;

    /// Overwrite the mutable columns of a prescription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn update_prescription(&mut self, prescription: &Prescription)
    -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Prescription items
    // ------------------------------------------------------------------

    /// All items of a prescription in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn prescription_items(
        &mut self,
        prescription_id: PrescriptionId,
    ) -> Result<Vec<PrescriptionItem>, StoreError>;

    /// Read one prescription item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn prescription_item(
        &mut self,
        id: PrescriptionItemId,
    ) -> Result<Option<PrescriptionItem>, StoreError>;

    /// Insert a prescription item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConstraintViolation`] if the prescription or
    /// medicine does not exist.
    async fn insert_prescription_item(&mut self, item: &PrescriptionItem)
    -> Result<(), StoreError>;

    /// Delete a prescription item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConstraintViolation`] if dispense lines still
    /// reference the item.
    async fn delete_prescription_item(&mut self, id: PrescriptionItemId)
    -> Result<(), StoreError>;

    /// Whether any dispense line, of any status, references the item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn item_has_dispense_lines(&mut self, id: PrescriptionItemId)
    -> Result<bool, StoreError>;

    // ------------------------------------------------------------------
    // Dispenses
    // ------------------------------------------------------------------

    /// Read a dispense.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn dispense(&mut self, id: DispenseId) -> Result<Option<Dispense>, StoreError>;

    /// Read a dispense and hold its row lock until the unit ends.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn lock_dispense(&mut self, id: DispenseId) -> Result<Option<Dispense>, StoreError>;

    /// Insert a new dispense.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn insert_dispense(&mut self, dispense: &Dispense) -> Result<(), StoreError>;

    /// Overwrite the mutable columns of a dispense.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn update_dispense(&mut self, dispense: &Dispense) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Dispense lines
    // ------------------------------------------------------------------

    /// All lines of a dispense in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn dispense_lines(&mut self, dispense_id: DispenseId)
    -> Result<Vec<DispenseLine>, StoreError>;

    /// Insert a dispense line.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn insert_dispense_line(&mut self, line: &DispenseLine) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Sum of `quantity_dispensed` over lines for `item_id` whose dispense
    /// is COMPLETED. Zero when there are none.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn completed_quantity(&mut self, item_id: PrescriptionItemId)
    -> Result<Decimal, StoreError>;

    /// Sum of `quantity_dispensed` over lines of one dispense for `item_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn pending_quantity(
        &mut self,
        dispense_id: DispenseId,
        item_id: PrescriptionItemId,
    ) -> Result<Decimal, StoreError>;

    // ------------------------------------------------------------------
    // Boundary
    // ------------------------------------------------------------------

    /// Make every write of this unit durable and release its locks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the commit fails; nothing is applied then.
    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard every write of this unit and release its locks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    async fn rollback(&mut self) -> Result<(), StoreError>;
}
