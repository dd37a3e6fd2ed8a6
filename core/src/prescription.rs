//! Prescription aggregate: dispensing limits, status rollup and item edits.
//!
//! Quantities counted against a prescription item come from two places:
//!
//! - lines of COMPLETED dispenses ([`completed_dispensed_quantity`]), which are
//!   durable and drive the rollup status
//! - lines already added to the PENDING dispense being edited
//!   ([`pending_dispensed_quantity`])
//!
//! Lines sitting in *other* pending dispenses are deliberately not counted;
//! completion re-validates limits under the prescription lock instead
//! ([`check_completion_limits`]).

use crate::error::{DispensaryError, Result};
use crate::quantities;
use crate::store::UnitOfWork;
use crate::types::{
    ActorId, DispenseId, DispenseLine, EncounterId, NewPrescriptionItem, Prescription,
    PrescriptionId, PrescriptionItem, PrescriptionItemId, PrescriptionStatus,
    PrescriptionWithItems,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;

// ============================================================================
// Progress and rollup
// ============================================================================

/// Completed quantity of one item against its prescribed quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemProgress {
    /// Item
    pub item_id: PrescriptionItemId,
    /// Prescribed quantity
    pub prescribed: Decimal,
    /// Quantity on COMPLETED dispenses
    pub completed: Decimal,
}

impl ItemProgress {
    /// Whether the item has been dispensed in full.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.completed >= self.prescribed
    }
}

/// Dispensing progress over every item of a prescription.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispenseProgress {
    /// One entry per item
    pub items: Vec<ItemProgress>,
}

impl DispenseProgress {
    /// Every item satisfied. A prescription without items is never fully dispensed.
    #[must_use]
    pub fn is_fully_dispensed(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(ItemProgress::is_satisfied)
    }

    /// Something was dispensed but not everything.
    #[must_use]
    pub fn is_partially_dispensed(&self) -> bool {
        self.items.iter().any(|p| p.completed > Decimal::ZERO) && !self.is_fully_dispensed()
    }

    /// Status after a completed dispense, given the current status.
    ///
    /// Never moves backwards: a DISPENSED or CANCELED prescription keeps its
    /// status, and an untouched prescription keeps CREATED/UPDATED.
    #[must_use]
    pub fn rollup_status(&self, current: PrescriptionStatus) -> PrescriptionStatus {
        match current {
            PrescriptionStatus::Dispensed | PrescriptionStatus::Canceled => current,
            _ if self.is_fully_dispensed() => PrescriptionStatus::Dispensed,
            _ if self.is_partially_dispensed() => PrescriptionStatus::PartiallyDispensed,
            _ => current,
        }
    }
}

/// Sum of quantities on COMPLETED dispenses for an item.
///
/// # Errors
///
/// Returns [`DispensaryError::Store`] on backend failure.
pub async fn completed_dispensed_quantity(
    uow: &mut dyn UnitOfWork,
    item_id: PrescriptionItemId,
) -> Result<Decimal> {
    Ok(uow.completed_quantity(item_id).await?)
}

/// Sum of quantities already added for an item to one dispense.
///
/// # Errors
///
/// Returns [`DispensaryError::Store`] on backend failure.
pub async fn pending_dispensed_quantity(
    uow: &mut dyn UnitOfWork,
    dispense_id: DispenseId,
    item_id: PrescriptionItemId,
) -> Result<Decimal> {
    Ok(uow.pending_quantity(dispense_id, item_id).await?)
}

/// Load completed quantities for every item of a prescription.
///
/// # Errors
///
/// Returns [`DispensaryError::Store`] on backend failure.
pub async fn load_progress(
    uow: &mut dyn UnitOfWork,
    prescription_id: PrescriptionId,
) -> Result<DispenseProgress> {
    let items = uow.prescription_items(prescription_id).await?;
    let mut progress = DispenseProgress {
        items: Vec::with_capacity(items.len()),
    };
    for item in items {
        let completed = uow.completed_quantity(item.id).await?;
        progress.items.push(ItemProgress {
            item_id: item.id,
            prescribed: item.quantity_prescribed,
            completed,
        });
    }
    Ok(progress)
}

/// Whether every item of the prescription has been dispensed in full.
///
/// # Errors
///
/// Returns [`DispensaryError::Store`] on backend failure.
pub async fn is_fully_dispensed(
    uow: &mut dyn UnitOfWork,
    prescription_id: PrescriptionId,
) -> Result<bool> {
    Ok(load_progress(uow, prescription_id).await?.is_fully_dispensed())
}

/// Whether the prescription has been dispensed in part.
///
/// # Errors
///
/// Returns [`DispensaryError::Store`] on backend failure.
pub async fn is_partially_dispensed(
    uow: &mut dyn UnitOfWork,
    prescription_id: PrescriptionId,
) -> Result<bool> {
    Ok(load_progress(uow, prescription_id)
        .await?
        .is_partially_dispensed())
}

/// Check that adding `quantity` of `item` to a pending dispense stays within
/// the prescribed quantity. Returns the total the item would reach.
///
/// # Errors
///
/// Returns [`DispensaryError::LimitExceeded`] when
/// `completed + pending + quantity > prescribed`.
pub async fn check_line_limit(
    uow: &mut dyn UnitOfWork,
    dispense_id: DispenseId,
    item: &PrescriptionItem,
    quantity: Decimal,
) -> Result<Decimal> {
    let completed = completed_dispensed_quantity(uow, item.id).await?;
    let pending = pending_dispensed_quantity(uow, dispense_id, item.id).await?;
    let total_after = quantities::add("requested total", completed, pending)?;
    let total_after = quantities::add("requested total", total_after, quantity)?;

    if total_after > item.quantity_prescribed {
        return Err(DispensaryError::LimitExceeded {
            item_id: item.id,
            prescribed: item.quantity_prescribed,
            requested_total: total_after,
        });
    }
    Ok(total_after)
}

/// Re-check every item touched by a dispense against what has been completed
/// since its lines were added. Callers hold the prescription lock.
///
/// # Errors
///
/// Returns [`DispensaryError::LimitExceeded`] for the first item over its
/// limit, [`DispensaryError::NotFound`] if a line's item is missing.
pub async fn check_completion_limits(
    uow: &mut dyn UnitOfWork,
    lines: &[DispenseLine],
    items: &[PrescriptionItem],
) -> Result<()> {
    let mut per_item: BTreeMap<PrescriptionItemId, Decimal> = BTreeMap::new();
    for line in lines {
        let total = per_item
            .entry(line.prescription_item_id)
            .or_insert(Decimal::ZERO);
        *total = quantities::add("dispensed quantity", *total, line.quantity_dispensed)?;
    }

    for (item_id, quantity) in per_item {
        let item = items
            .iter()
            .find(|item| item.id == item_id)
            .ok_or_else(|| DispensaryError::not_found("prescription item", item_id))?;
        let completed = uow.completed_quantity(item_id).await?;
        let requested_total = quantities::add("requested total", completed, quantity)?;
        if requested_total > item.quantity_prescribed {
            return Err(DispensaryError::LimitExceeded {
                item_id,
                prescribed: item.quantity_prescribed,
                requested_total,
            });
        }
    }
    Ok(())
}

/// Recompute and persist the rollup status. Returns the new status when it
/// changed.
///
/// # Errors
///
/// Returns [`DispensaryError::Store`] on backend failure.
pub async fn apply_rollup(
    uow: &mut dyn UnitOfWork,
    prescription: &mut Prescription,
    now: DateTime<Utc>,
) -> Result<Option<PrescriptionStatus>> {
    let progress = load_progress(uow, prescription.id).await?;
    let next = progress.rollup_status(prescription.status);
    if next == prescription.status {
        return Ok(None);
    }

    tracing::debug!(
        prescription_id = %prescription.id,
        from = %prescription.status,
        to = %next,
        "Prescription status rolled up"
    );
    prescription.status = next;
    prescription.updated_at = now;
    uow.update_prescription(prescription).await?;
    Ok(Some(next))
}

// ============================================================================
// Prescription edits
// ============================================================================

/// Input for a new prescription.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewPrescription {
    /// Encounter the prescription is written in
    pub encounter_id: EncounterId,
    /// Start of validity; defaults to now
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    /// End of validity
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
    /// Free-text notes
    #[serde(default)]
    pub notes: Option<String>,
    /// Prescribing actor
    #[serde(default)]
    pub created_by: Option<ActorId>,
    /// At least one item
    pub items: Vec<NewPrescriptionItem>,
}

/// Changes to a prescription's header. `None` leaves a field as is.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PrescriptionUpdate {
    /// New start of validity
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    /// New end of validity
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
    /// New notes
    #[serde(default)]
    pub notes: Option<String>,
    /// Editing actor
    #[serde(default)]
    pub updated_by: Option<ActorId>,
}

/// Cancellation request.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Cancellation {
    /// Why the prescription is withdrawn
    pub reason: String,
    /// Who withdrew it
    pub canceled_by: ActorId,
}

fn validate_item(item: &NewPrescriptionItem) -> Result<()> {
    quantities::positive("quantity_prescribed", item.quantity_prescribed)?;
    Ok(())
}

async fn ensure_medicine(uow: &mut dyn UnitOfWork, item: &NewPrescriptionItem) -> Result<()> {
    if uow.medicine(item.medicine_id).await?.is_none() {
        return Err(DispensaryError::not_found("medicine", item.medicine_id));
    }
    Ok(())
}

async fn lock_existing(
    uow: &mut dyn UnitOfWork,
    prescription_id: PrescriptionId,
) -> Result<Prescription> {
    uow.lock_prescription(prescription_id)
        .await?
        .ok_or_else(|| DispensaryError::not_found("prescription", prescription_id))
}

fn ensure_items_editable(prescription: &Prescription) -> Result<()> {
    if prescription.status.allows_item_changes() {
        Ok(())
    } else {
        Err(DispensaryError::invalid_state(format!(
            "cannot change items of a {} prescription",
            prescription.status
        )))
    }
}

/// Mark an edit. Status becomes UPDATED only before dispensing started.
fn touch(prescription: &mut Prescription, actor: Option<ActorId>, now: DateTime<Utc>) {
    if matches!(
        prescription.status,
        PrescriptionStatus::Created | PrescriptionStatus::Updated
    ) {
        prescription.status = PrescriptionStatus::Updated;
    }
    prescription.updated_at = now;
    if actor.is_some() {
        prescription.updated_by = actor;
    }
}

/// Load a prescription with its items.
///
/// # Errors
///
/// Returns [`DispensaryError::NotFound`] if the prescription does not exist.
pub async fn load_with_items(
    uow: &mut dyn UnitOfWork,
    prescription_id: PrescriptionId,
) -> Result<PrescriptionWithItems> {
    let prescription = uow
        .prescription(prescription_id)
        .await?
        .ok_or_else(|| DispensaryError::not_found("prescription", prescription_id))?;
    let items = uow.prescription_items(prescription_id).await?;
    Ok(PrescriptionWithItems {
        prescription,
        items,
    })
}

/// Insert a prescription and its items. The encounter reference must have
/// been verified by the caller.
///
/// # Errors
///
/// - [`DispensaryError::Validation`] for an empty item list or a quantity
///   that is not positive or out of bounds
/// - [`DispensaryError::NotFound`] if a referenced medicine does not exist
pub async fn create(
    uow: &mut dyn UnitOfWork,
    input: NewPrescription,
    now: DateTime<Utc>,
) -> Result<PrescriptionWithItems> {
    if input.items.is_empty() {
        return Err(DispensaryError::validation(
            "prescription must have at least one item",
        ));
    }
    for item in &input.items {
        validate_item(item)?;
        ensure_medicine(uow, item).await?;
    }

    let prescription = Prescription {
        id: PrescriptionId::new(),
        encounter_id: input.encounter_id,
        status: PrescriptionStatus::Created,
        valid_from: input.valid_from.unwrap_or(now),
        valid_to: input.valid_to,
        notes: input.notes,
        created_at: now,
        created_by: input.created_by,
        updated_at: now,
        updated_by: input.created_by,
        canceled_at: None,
        canceled_by: None,
        canceled_reason: None,
    };
    uow.insert_prescription(&prescription).await?;

    let mut items = Vec::with_capacity(input.items.len());
    for new_item in input.items {
        let item = new_item.into_item(prescription.id, now);
        uow.insert_prescription_item(&item).await?;
        items.push(item);
    }

    Ok(PrescriptionWithItems {
        prescription,
        items,
    })
}

/// Apply header changes.
///
/// # Errors
///
/// - [`DispensaryError::NotFound`] if the prescription does not exist
/// - [`DispensaryError::InvalidState`] if it is canceled
pub async fn update(
    uow: &mut dyn UnitOfWork,
    prescription_id: PrescriptionId,
    changes: PrescriptionUpdate,
    now: DateTime<Utc>,
) -> Result<PrescriptionWithItems> {
    let mut prescription = lock_existing(uow, prescription_id).await?;
    if prescription.status == PrescriptionStatus::Canceled {
        return Err(DispensaryError::invalid_state(
            "cannot edit a canceled prescription",
        ));
    }

    if let Some(valid_from) = changes.valid_from {
        prescription.valid_from = valid_from;
    }
    if let Some(valid_to) = changes.valid_to {
        prescription.valid_to = Some(valid_to);
    }
    if let Some(notes) = changes.notes {
        prescription.notes = Some(notes);
    }
    touch(&mut prescription, changes.updated_by, now);
    uow.update_prescription(&prescription).await?;

    let items = uow.prescription_items(prescription_id).await?;
    Ok(PrescriptionWithItems {
        prescription,
        items,
    })
}

/// Append an item.
///
/// # Errors
///
/// - [`DispensaryError::NotFound`] if the prescription or medicine does not exist
/// - [`DispensaryError::InvalidState`] if the prescription is canceled or dispensed
/// - [`DispensaryError::Validation`] for a non-positive quantity
pub async fn add_item(
    uow: &mut dyn UnitOfWork,
    prescription_id: PrescriptionId,
    new_item: NewPrescriptionItem,
    now: DateTime<Utc>,
) -> Result<PrescriptionWithItems> {
    let mut prescription = lock_existing(uow, prescription_id).await?;
    ensure_items_editable(&prescription)?;
    validate_item(&new_item)?;
    ensure_medicine(uow, &new_item).await?;

    let item = new_item.into_item(prescription_id, now);
    uow.insert_prescription_item(&item).await?;

    touch(&mut prescription, None, now);
    uow.update_prescription(&prescription).await?;

    let items = uow.prescription_items(prescription_id).await?;
    Ok(PrescriptionWithItems {
        prescription,
        items,
    })
}

/// Remove an item that nothing has been dispensed against.
///
/// # Errors
///
/// - [`DispensaryError::NotFound`] if the prescription does not exist or the
///   item does not belong to it
/// - [`DispensaryError::InvalidState`] if the prescription is canceled or
///   dispensed, or a dispense line references the item
pub async fn remove_item(
    uow: &mut dyn UnitOfWork,
    prescription_id: PrescriptionId,
    item_id: PrescriptionItemId,
    now: DateTime<Utc>,
) -> Result<PrescriptionWithItems> {
    let mut prescription = lock_existing(uow, prescription_id).await?;
    ensure_items_editable(&prescription)?;

    match uow.prescription_item(item_id).await? {
        Some(item) if item.prescription_id == prescription_id => {}
        _ => return Err(DispensaryError::not_found("prescription item", item_id)),
    }
    if uow.item_has_dispense_lines(item_id).await? {
        return Err(DispensaryError::invalid_state(
            "cannot remove an item that has dispense lines",
        ));
    }

    uow.delete_prescription_item(item_id).await?;
    touch(&mut prescription, None, now);
    uow.update_prescription(&prescription).await?;
    // the remaining items may all be satisfied already
    apply_rollup(uow, &mut prescription, now).await?;

    let items = uow.prescription_items(prescription_id).await?;
    Ok(PrescriptionWithItems {
        prescription,
        items,
    })
}

/// Withdraw a prescription. Cancelling twice returns it unchanged.
///
/// # Errors
///
/// - [`DispensaryError::NotFound`] if the prescription does not exist
/// - [`DispensaryError::InvalidState`] if it has been fully dispensed
pub async fn cancel(
    uow: &mut dyn UnitOfWork,
    prescription_id: PrescriptionId,
    cancellation: Cancellation,
    now: DateTime<Utc>,
) -> Result<PrescriptionWithItems> {
    let mut prescription = lock_existing(uow, prescription_id).await?;
    match prescription.status {
        PrescriptionStatus::Canceled => {}
        PrescriptionStatus::Dispensed => {
            return Err(DispensaryError::invalid_state(
                "cannot cancel a dispensed prescription",
            ));
        }
        _ => {
            prescription.status = PrescriptionStatus::Canceled;
            prescription.canceled_at = Some(now);
            prescription.canceled_by = Some(cancellation.canceled_by);
            prescription.canceled_reason = Some(cancellation.reason);
            prescription.updated_at = now;
            prescription.updated_by = Some(cancellation.canceled_by);
            uow.update_prescription(&prescription).await?;
        }
    }

    let items = uow.prescription_items(prescription_id).await?;
    Ok(PrescriptionWithItems {
        prescription,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn progress(pairs: &[(i64, i64)]) -> DispenseProgress {
        DispenseProgress {
            items: pairs
                .iter()
                .map(|&(prescribed, completed)| ItemProgress {
                    item_id: PrescriptionItemId::new(),
                    prescribed: Decimal::from(prescribed),
                    completed: Decimal::from(completed),
                })
                .collect(),
        }
    }

    #[test]
    fn two_of_three_items_satisfied_is_partial() {
        let p = progress(&[(5, 5), (3, 3), (2, 0)]);
        assert!(!p.is_fully_dispensed());
        assert!(p.is_partially_dispensed());
        assert_eq!(
            p.rollup_status(PrescriptionStatus::Created),
            PrescriptionStatus::PartiallyDispensed
        );
    }

    #[test]
    fn all_items_satisfied_is_dispensed() {
        let p = progress(&[(5, 5), (3, 3), (2, 2)]);
        assert_eq!(
            p.rollup_status(PrescriptionStatus::PartiallyDispensed),
            PrescriptionStatus::Dispensed
        );
    }

    #[test]
    fn nothing_dispensed_keeps_status() {
        let p = progress(&[(5, 0)]);
        assert_eq!(
            p.rollup_status(PrescriptionStatus::Updated),
            PrescriptionStatus::Updated
        );
    }

    #[test]
    fn empty_prescription_is_never_fully_dispensed() {
        let p = DispenseProgress::default();
        assert!(!p.is_fully_dispensed());
        assert!(!p.is_partially_dispensed());
    }

    #[test]
    fn dispensed_is_never_downgraded() {
        // an item added after full dispensing leaves the progress partial
        let p = progress(&[(5, 5), (1, 0)]);
        assert_eq!(
            p.rollup_status(PrescriptionStatus::Dispensed),
            PrescriptionStatus::Dispensed
        );
    }

    fn rank(status: PrescriptionStatus) -> u8 {
        match status {
            PrescriptionStatus::Created | PrescriptionStatus::Updated => 0,
            PrescriptionStatus::PartiallyDispensed => 1,
            PrescriptionStatus::Dispensed => 2,
            PrescriptionStatus::Canceled => 3,
        }
    }

    proptest! {
        #[test]
        fn rollup_is_forward_only(
            pairs in prop::collection::vec((1i64..20, 0i64..25), 1..6),
            current in prop_oneof![
                Just(PrescriptionStatus::Created),
                Just(PrescriptionStatus::Updated),
                Just(PrescriptionStatus::PartiallyDispensed),
                Just(PrescriptionStatus::Dispensed),
            ],
        ) {
            let p = progress(&pairs);
            let next = p.rollup_status(current);
            prop_assert!(rank(next) >= rank(current));
        }

        #[test]
        fn dispensed_iff_every_item_satisfied(
            pairs in prop::collection::vec((1i64..20, 0i64..25), 1..6),
        ) {
            let p = progress(&pairs);
            let all = pairs.iter().all(|&(prescribed, completed)| completed >= prescribed);
            prop_assert_eq!(
                p.rollup_status(PrescriptionStatus::Created) == PrescriptionStatus::Dispensed,
                all
            );
        }
    }
}
