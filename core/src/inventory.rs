//! Inventory ledger: authoritative stock per medicine.
//!
//! Stock only moves through this module. [`reserve_and_decrement`] is the
//! authoritative check used at dispense completion; it locks every medicine
//! involved in ascending id order, verifies all of them, and writes only if
//! every check passed. [`advisory_stock_check`] is the lock-free early check
//! used when a line is added and may be stale by the time of completion.

use crate::error::{DispensaryError, Result};
use crate::quantities;
use crate::store::UnitOfWork;
use crate::types::{DispenseLine, Medicine, MedicineId, PrescriptionItem, PrescriptionItemId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Required quantity per medicine, iterated in ascending [`MedicineId`] order.
pub type Demand = BTreeMap<MedicineId, Decimal>;

/// A stock change applied to one medicine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StockMovement {
    /// Medicine whose stock changed
    pub medicine_id: MedicineId,
    /// Stock before the change
    pub before: Decimal,
    /// Stock after the change
    pub after: Decimal,
}

/// Input for registering a medicine.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewMedicine {
    /// Display name
    pub name: String,
    /// Active ingredient
    #[serde(default)]
    pub generic_name: Option<String>,
    /// Dosage form
    #[serde(default)]
    pub form: Option<String>,
    /// Strength
    #[serde(default)]
    pub strength: Option<String>,
    /// Stock keeping unit
    #[serde(default)]
    pub unit: Option<String>,
    /// Opening stock
    #[serde(default)]
    pub initial_stock: Decimal,
}

impl NewMedicine {
    /// Medicine with a name and opening stock only.
    pub fn new(name: impl Into<String>, initial_stock: Decimal) -> Self {
        Self {
            name: name.into(),
            generic_name: None,
            form: None,
            strength: None,
            unit: None,
            initial_stock,
        }
    }
}

/// Sum line quantities per medicine by joining each line to its item.
///
/// # Errors
///
/// Returns [`DispensaryError::NotFound`] if a line references an item that is
/// not in `items`, [`DispensaryError::Validation`] if a total overflows.
pub fn aggregate_demand(lines: &[DispenseLine], items: &[PrescriptionItem]) -> Result<Demand> {
    let medicine_of: HashMap<PrescriptionItemId, MedicineId> =
        items.iter().map(|item| (item.id, item.medicine_id)).collect();

    let mut demand = Demand::new();
    for line in lines {
        let medicine_id = medicine_of
            .get(&line.prescription_item_id)
            .copied()
            .ok_or_else(|| {
                DispensaryError::not_found("prescription item", line.prescription_item_id)
            })?;
        let total = demand.entry(medicine_id).or_insert(Decimal::ZERO);
        *total = quantities::add("required quantity", *total, line.quantity_dispensed)?;
    }
    Ok(demand)
}

/// Lock, check and decrement stock for every medicine in `demand`.
///
/// Locks are taken in ascending medicine id order. No stock is written unless
/// every medicine has enough; on error the caller must roll back its unit of
/// work to release the locks.
///
/// # Errors
///
/// - [`DispensaryError::NotFound`] if a medicine does not exist
/// - [`DispensaryError::InsufficientStock`] for the first medicine (in id
///   order) whose stock is below its requirement
/// - [`DispensaryError::Store`] on backend failure
pub async fn reserve_and_decrement(
    uow: &mut dyn UnitOfWork,
    demand: &Demand,
    now: DateTime<Utc>,
) -> Result<Vec<StockMovement>> {
    let mut locked = Vec::with_capacity(demand.len());
    for (&medicine_id, &required) in demand {
        let medicine = uow
            .lock_medicine(medicine_id)
            .await?
            .ok_or_else(|| DispensaryError::not_found("medicine", medicine_id))?;
        locked.push((medicine, required));
    }

    if let Some((medicine, required)) = locked.iter().find(|(m, required)| m.stock < *required) {
        tracing::debug!(
            medicine_id = %medicine.id,
            required = %required,
            available = %medicine.stock,
            "Stock check failed"
        );
        return Err(DispensaryError::InsufficientStock {
            medicine_id: medicine.id,
            required: *required,
            available: medicine.stock,
        });
    }

    let mut movements = Vec::with_capacity(locked.len());
    for (medicine, required) in locked {
        let after = medicine.stock - required;
        uow.set_medicine_stock(medicine.id, after, now).await?;
        movements.push(StockMovement {
            medicine_id: medicine.id,
            before: medicine.stock,
            after,
        });
    }
    Ok(movements)
}

/// Early stock check for a single line, without locking.
///
/// Passes when the medicine is unknown; completion performs the real check.
///
/// # Errors
///
/// Returns [`DispensaryError::InsufficientStock`] when current stock is below
/// `quantity`.
pub async fn advisory_stock_check(
    uow: &mut dyn UnitOfWork,
    medicine_id: MedicineId,
    quantity: Decimal,
) -> Result<()> {
    match uow.medicine(medicine_id).await? {
        Some(medicine) if medicine.stock < quantity => Err(DispensaryError::InsufficientStock {
            medicine_id,
            required: quantity,
            available: medicine.stock,
        }),
        _ => Ok(()),
    }
}

/// Add received stock to a medicine under its row lock.
///
/// # Errors
///
/// - [`DispensaryError::Validation`] if `quantity` is not positive, carries
///   more than three decimal places, or would push stock out of bounds
/// - [`DispensaryError::NotFound`] if the medicine does not exist
pub async fn receive_stock(
    uow: &mut dyn UnitOfWork,
    medicine_id: MedicineId,
    quantity: Decimal,
    now: DateTime<Utc>,
) -> Result<Medicine> {
    quantities::positive("received quantity", quantity)?;

    let mut medicine = uow
        .lock_medicine(medicine_id)
        .await?
        .ok_or_else(|| DispensaryError::not_found("medicine", medicine_id))?;

    medicine.stock =
        quantities::non_negative("stock", quantities::add("stock", medicine.stock, quantity)?)?;
    medicine.updated_at = now;
    uow.set_medicine_stock(medicine_id, medicine.stock, now).await?;
    Ok(medicine)
}

/// Register a new medicine with its opening stock.
///
/// # Errors
///
/// Returns [`DispensaryError::Validation`] if the name is blank or the
/// opening stock is negative or out of bounds.
pub async fn register_medicine(
    uow: &mut dyn UnitOfWork,
    input: NewMedicine,
    now: DateTime<Utc>,
) -> Result<Medicine> {
    if input.name.trim().is_empty() {
        return Err(DispensaryError::validation("medicine name must not be empty"));
    }
    quantities::non_negative("initial stock", input.initial_stock)?;

    let medicine = Medicine {
        id: MedicineId::new(),
        name: input.name,
        generic_name: input.generic_name,
        form: input.form,
        strength: input.strength,
        unit: input.unit,
        stock: input.initial_stock,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    uow.insert_medicine(&medicine).await?;
    Ok(medicine)
}
