//! In-memory transactional store.
//!
//! [`InMemoryStore`] serializes units of work: `begin` takes a store-wide
//! lock and works on a copy of the tables, `commit` writes the copy back,
//! and dropping or rolling back simply discards it. That makes every unit
//! behave as if it held every row lock, which is stricter than PostgreSQL
//! but gives the same outcomes for the dispensary invariants.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispensary_core::store::{DispensaryStore, StoreError, UnitOfWork};
use dispensary_core::{
    Dispense, DispenseId, DispenseLine, DispenseStatus, Medicine, MedicineId, Prescription,
    PrescriptionId, PrescriptionItem, PrescriptionItemId,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct Tables {
    medicines: HashMap<MedicineId, Medicine>,
    prescriptions: HashMap<PrescriptionId, Prescription>,
    items: Vec<PrescriptionItem>,
    dispenses: HashMap<DispenseId, Dispense>,
    lines: Vec<DispenseLine>,
}

/// Sum quantities the way a `NUMERIC` column would, failing instead of
/// panicking on overflow.
fn sum_quantities<'a>(mut lines: impl Iterator<Item = &'a DispenseLine>) -> Result<Decimal, StoreError> {
    lines.try_fold(Decimal::ZERO, |total, line| {
        total
            .checked_add(line.quantity_dispensed)
            .ok_or_else(|| StoreError::DatabaseError("numeric overflow in quantity sum".into()))
    })
}

impl Tables {
    fn completed_quantity(&self, item_id: PrescriptionItemId) -> Result<Decimal, StoreError> {
        sum_quantities(
            self.lines
                .iter()
                .filter(|line| line.prescription_item_id == item_id)
                .filter(|line| {
                    self.dispenses
                        .get(&line.dispense_id)
                        .is_some_and(|d| d.status == DispenseStatus::Completed)
                }),
        )
    }
}

/// HashMap-backed [`DispensaryStore`] for fast, deterministic tests.
///
/// # Example
///
/// ```ignore
/// let store = InMemoryStore::new();
/// let aspirin = store.seed_medicine("Aspirin", Decimal::from(10)).await;
/// assert_eq!(store.stock(aspirin.id).await, Some(Decimal::from(10)));
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a medicine directly, bypassing validation.
    pub async fn seed_medicine(&self, name: &str, stock: Decimal) -> Medicine {
        let now = Utc::now();
        let medicine = Medicine {
            id: MedicineId::new(),
            name: name.to_string(),
            generic_name: None,
            form: None,
            strength: None,
            unit: None,
            stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .lock()
            .await
            .medicines
            .insert(medicine.id, medicine.clone());
        medicine
    }

    /// Committed stock of a medicine
    pub async fn stock(&self, id: MedicineId) -> Option<Decimal> {
        self.tables.lock().await.medicines.get(&id).map(|m| m.stock)
    }

    /// Committed state of a dispense
    pub async fn dispense_snapshot(&self, id: DispenseId) -> Option<Dispense> {
        self.tables.lock().await.dispenses.get(&id).cloned()
    }

    /// Committed state of a prescription
    pub async fn prescription_snapshot(&self, id: PrescriptionId) -> Option<Prescription> {
        self.tables.lock().await.prescriptions.get(&id).cloned()
    }

    /// Committed completed quantity for an item
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the sum overflows.
    pub async fn completed_total(&self, item_id: PrescriptionItemId) -> Result<Decimal, StoreError> {
        self.tables.lock().await.completed_quantity(item_id)
    }
}

#[async_trait]
impl DispensaryStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork {
            guard: Some(guard),
            working,
        }))
    }
}

/// Unit of work over a private copy of the tables.
pub struct InMemoryUnitOfWork {
    guard: Option<OwnedMutexGuard<Tables>>,
    working: Tables,
}

impl InMemoryUnitOfWork {
    fn tables(&mut self) -> Result<&mut Tables, StoreError> {
        if self.guard.is_some() {
            Ok(&mut self.working)
        } else {
            Err(StoreError::Finished)
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn medicine(&mut self, id: MedicineId) -> Result<Option<Medicine>, StoreError> {
        Ok(self.tables()?.medicines.get(&id).cloned())
    }

    async fn lock_medicine(&mut self, id: MedicineId) -> Result<Option<Medicine>, StoreError> {
        self.medicine(id).await
    }

    async fn insert_medicine(&mut self, medicine: &Medicine) -> Result<(), StoreError> {
        self.tables()?
            .medicines
            .insert(medicine.id, medicine.clone());
        Ok(())
    }

    async fn set_medicine_stock(
        &mut self,
        id: MedicineId,
        stock: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if stock < Decimal::ZERO {
            return Err(StoreError::ConstraintViolation(format!(
                "stock of medicine {id} would become {stock}"
            )));
        }
        let medicine = self
            .tables()?
            .medicines
            .get_mut(&id)
            .ok_or_else(|| StoreError::DatabaseError(format!("medicine {id} missing")))?;
        medicine.stock = stock;
        medicine.updated_at = updated_at;
        Ok(())
    }

    async fn prescription(
        &mut self,
        id: PrescriptionId,
    ) -> Result<Option<Prescription>, StoreError> {
        Ok(self.tables()?.prescriptions.get(&id).cloned())
    }

    async fn lock_prescription(
        &mut self,
        id: PrescriptionId,
    ) -> Result<Option<Prescription>, StoreError> {
        self.prescription(id).await
    }

    async fn insert_prescription(&mut self, prescription: &Prescription) -> Result<(), StoreError> {
        self.tables()?
            .prescriptions
            .insert(prescription.id, prescription.clone());
        Ok(())
    }

    async fn update_prescription(&mut self, prescription: &Prescription) -> Result<(), StoreError> {
        let tables = self.tables()?;
        match tables.prescriptions.get_mut(&prescription.id) {
            Some(row) => {
                *row = prescription.clone();
                Ok(())
            }
            None => Err(StoreError::DatabaseError(format!(
                "prescription {} missing",
                prescription.id
            ))),
        }
    }

    async fn prescription_items(
        &mut self,
        prescription_id: PrescriptionId,
    ) -> Result<Vec<PrescriptionItem>, StoreError> {
        Ok(self
            .tables()?
            .items
            .iter()
            .filter(|item| item.prescription_id == prescription_id)
            .cloned()
            .collect())
    }

    async fn prescription_item(
        &mut self,
        id: PrescriptionItemId,
    ) -> Result<Option<PrescriptionItem>, StoreError> {
        Ok(self
            .tables()?
            .items
            .iter()
            .find(|item| item.id == id)
            .cloned())
    }

    async fn insert_prescription_item(&mut self, item: &PrescriptionItem) -> Result<(), StoreError> {
        let tables = self.tables()?;
        if !tables.prescriptions.contains_key(&item.prescription_id) {
            return Err(StoreError::ConstraintViolation(format!(
                "prescription {} does not exist",
                item.prescription_id
            )));
        }
        if !tables.medicines.contains_key(&item.medicine_id) {
            return Err(StoreError::ConstraintViolation(format!(
                "medicine {} does not exist",
                item.medicine_id
            )));
        }
        tables.items.push(item.clone());
        Ok(())
    }

    async fn delete_prescription_item(&mut self, id: PrescriptionItemId) -> Result<(), StoreError> {
        let tables = self.tables()?;
        if tables.lines.iter().any(|l| l.prescription_item_id == id) {
            return Err(StoreError::ConstraintViolation(format!(
                "prescription item {id} is referenced by dispense lines"
            )));
        }
        tables.items.retain(|item| item.id != id);
        Ok(())
    }

    async fn item_has_dispense_lines(&mut self, id: PrescriptionItemId) -> Result<bool, StoreError> {
        Ok(self
            .tables()?
            .lines
            .iter()
            .any(|line| line.prescription_item_id == id))
    }

    async fn dispense(&mut self, id: DispenseId) -> Result<Option<Dispense>, StoreError> {
        Ok(self.tables()?.dispenses.get(&id).cloned())
    }

    async fn lock_dispense(&mut self, id: DispenseId) -> Result<Option<Dispense>, StoreError> {
        self.dispense(id).await
    }

    async fn insert_dispense(&mut self, dispense: &Dispense) -> Result<(), StoreError> {
        let tables = self.tables()?;
        if !tables.prescriptions.contains_key(&dispense.prescription_id) {
            return Err(StoreError::ConstraintViolation(format!(
                "prescription {} does not exist",
                dispense.prescription_id
            )));
        }
        tables.dispenses.insert(dispense.id, dispense.clone());
        Ok(())
    }

    async fn update_dispense(&mut self, dispense: &Dispense) -> Result<(), StoreError> {
        let tables = self.tables()?;
        match tables.dispenses.get_mut(&dispense.id) {
            Some(row) => {
                *row = dispense.clone();
                Ok(())
            }
            None => Err(StoreError::DatabaseError(format!(
                "dispense {} missing",
                dispense.id
            ))),
        }
    }

    async fn dispense_lines(
        &mut self,
        dispense_id: DispenseId,
    ) -> Result<Vec<DispenseLine>, StoreError> {
        Ok(self
            .tables()?
            .lines
            .iter()
            .filter(|line| line.dispense_id == dispense_id)
            .cloned()
            .collect())
    }

    async fn insert_dispense_line(&mut self, line: &DispenseLine) -> Result<(), StoreError> {
        let tables = self.tables()?;
        if !tables.dispenses.contains_key(&line.dispense_id) {
            return Err(StoreError::ConstraintViolation(format!(
                "dispense {} does not exist",
                line.dispense_id
            )));
        }
        tables.lines.push(line.clone());
        Ok(())
    }

    async fn completed_quantity(
        &mut self,
        item_id: PrescriptionItemId,
    ) -> Result<Decimal, StoreError> {
        self.tables()?.completed_quantity(item_id)
    }

    async fn pending_quantity(
        &mut self,
        dispense_id: DispenseId,
        item_id: PrescriptionItemId,
    ) -> Result<Decimal, StoreError> {
        sum_quantities(
            self.tables()?
                .lines
                .iter()
                .filter(|line| {
                    line.dispense_id == dispense_id && line.prescription_item_id == item_id
                }),
        )
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut guard = self.guard.take().ok_or(StoreError::Finished)?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.guard.take().ok_or(StoreError::Finished)?;
        self.working = Tables::default();
        Ok(())
    }
}
