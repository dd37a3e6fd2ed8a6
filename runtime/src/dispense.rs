//! Dispense workflow: PENDING → COMPLETED.
//!
//! # Completion
//!
//! [`DispenseWorkflow::complete`] runs in one unit of work:
//!
//! 1. lock the dispense; it must be PENDING and have lines
//! 2. lock the prescription; it must not be CANCELED
//! 3. re-check every item's limit against what has completed meanwhile
//! 4. lock medicines in id order, check all, decrement all
//! 5. mark the dispense COMPLETED and roll the prescription status forward
//! 6. commit, then publish `prescription_ready` in the background
//!
//! Any error before the commit rolls back everything, so the dispense stays
//! PENDING and no stock moves.

use crate::{DispensaryEnvironment, dispatch, finish};
use dispensary_core::event::PrescriptionReady;
use dispensary_core::store::UnitOfWork;
use dispensary_core::{
    ActorId, Dispense, DispenseId, DispenseLine, DispenseLineId, DispenseStatus,
    DispenseWithLines, DispensaryError, PrescriptionId, PrescriptionItemId, PrescriptionStatus,
    Result, inventory, prescription, quantities,
};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Request to open a dispense.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewDispense {
    /// Prescription to dispense against
    pub prescription_id: PrescriptionId,
    /// Free-text notes
    #[serde(default)]
    pub notes: Option<String>,
    /// Opening actor
    #[serde(default)]
    pub created_by: Option<ActorId>,
}

/// Request to append a line.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewDispenseLine {
    /// Item being dispensed
    pub prescription_item_id: PrescriptionItemId,
    /// Quantity handed out
    pub quantity_dispensed: Decimal,
    /// Free-text notes
    #[serde(default)]
    pub notes: Option<String>,
}

/// Request to complete a dispense.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Completion {
    /// Pharmacist handing out the medication
    pub dispensed_by: ActorId,
}

/// Coordinates dispenses against prescriptions and inventory.
#[derive(Clone, Debug)]
pub struct DispenseWorkflow {
    env: DispensaryEnvironment,
}

impl DispenseWorkflow {
    /// Create a workflow over `env`
    #[must_use]
    pub const fn new(env: DispensaryEnvironment) -> Self {
        Self { env }
    }

    /// Open a PENDING dispense with no lines.
    ///
    /// # Errors
    ///
    /// - [`DispensaryError::NotFound`] if the prescription does not exist
    /// - [`DispensaryError::InvalidState`] if it is DISPENSED or CANCELED
    #[tracing::instrument(skip(self, request), fields(prescription_id = %request.prescription_id))]
    pub async fn create_dispense(&self, request: NewDispense) -> Result<DispenseWithLines> {
        let mut uow = self.env.store.begin().await?;
        let outcome = self.create_in(uow.as_mut(), request).await;
        let dispense = finish(uow, outcome).await?;

        tracing::info!(dispense_id = %dispense.id, "Dispense created");
        Ok(DispenseWithLines {
            dispense,
            lines: Vec::new(),
        })
    }

    async fn create_in(&self, uow: &mut dyn UnitOfWork, request: NewDispense) -> Result<Dispense> {
        let prescription = uow
            .lock_prescription(request.prescription_id)
            .await?
            .ok_or_else(|| DispensaryError::not_found("prescription", request.prescription_id))?;

        if !prescription.status.accepts_dispense() {
            return Err(DispensaryError::invalid_state(format!(
                "prescription {} is {} and accepts no new dispense",
                prescription.id, prescription.status
            )));
        }

        let dispense = Dispense::pending(
            prescription.id,
            request.notes,
            request.created_by,
            self.env.clock.now(),
        );
        uow.insert_dispense(&dispense).await?;
        Ok(dispense)
    }

    /// Append a line to a PENDING dispense.
    ///
    /// # Errors
    ///
    /// - [`DispensaryError::NotFound`] if the dispense or item does not exist
    /// - [`DispensaryError::InvalidState`] if the dispense is not PENDING or
    ///   its prescription is canceled
    /// - [`DispensaryError::Validation`] for a quantity that is not positive
    ///   or out of bounds, or an item of another prescription
    /// - [`DispensaryError::LimitExceeded`] if the item would exceed its
    ///   prescribed quantity
    /// - [`DispensaryError::InsufficientStock`] if current stock is already
    ///   below the quantity (advisory)
    #[tracing::instrument(
        skip(self, request),
        fields(
            prescription_item_id = %request.prescription_item_id,
            quantity = %request.quantity_dispensed,
        )
    )]
    pub async fn add_line(
        &self,
        dispense_id: DispenseId,
        request: NewDispenseLine,
    ) -> Result<DispenseWithLines> {
        let mut uow = self.env.store.begin().await?;
        let outcome = self.add_line_in(uow.as_mut(), dispense_id, request).await;
        let result = finish(uow, outcome).await;

        match &result {
            Ok(_) => tracing::debug!("Dispense line added"),
            Err(error) => tracing::info!(error = %error, "Dispense line rejected"),
        }
        result
    }

    async fn add_line_in(
        &self,
        uow: &mut dyn UnitOfWork,
        dispense_id: DispenseId,
        request: NewDispenseLine,
    ) -> Result<DispenseWithLines> {
        let dispense = uow
            .lock_dispense(dispense_id)
            .await?
            .ok_or_else(|| DispensaryError::not_found("dispense", dispense_id))?;
        let item = uow
            .prescription_item(request.prescription_item_id)
            .await?
            .ok_or_else(|| {
                DispensaryError::not_found("prescription item", request.prescription_item_id)
            })?;

        if !dispense.is_pending() {
            return Err(DispensaryError::invalid_state(format!(
                "dispense {dispense_id} is {}",
                dispense.status
            )));
        }
        if item.prescription_id != dispense.prescription_id {
            return Err(DispensaryError::validation(format!(
                "prescription item {} does not belong to prescription {}",
                item.id, dispense.prescription_id
            )));
        }
        quantities::positive("quantity_dispensed", request.quantity_dispensed)?;

        let canceled = uow
            .prescription(dispense.prescription_id)
            .await?
            .is_some_and(|p| p.status == PrescriptionStatus::Canceled);
        if canceled {
            return Err(DispensaryError::invalid_state(format!(
                "prescription {} is canceled",
                dispense.prescription_id
            )));
        }

        prescription::check_line_limit(uow, dispense_id, &item, request.quantity_dispensed)
            .await?;
        inventory::advisory_stock_check(uow, item.medicine_id, request.quantity_dispensed)
            .await?;

        let line = DispenseLine {
            id: DispenseLineId::new(),
            dispense_id,
            prescription_item_id: item.id,
            quantity_dispensed: request.quantity_dispensed,
            notes: request.notes,
            created_at: self.env.clock.now(),
        };
        uow.insert_dispense_line(&line).await?;

        let lines = uow.dispense_lines(dispense_id).await?;
        Ok(DispenseWithLines { dispense, lines })
    }

    /// Complete a PENDING dispense: decrement stock, record the dispenser and
    /// roll the prescription status forward, atomically.
    ///
    /// # Errors
    ///
    /// - [`DispensaryError::NotFound`] if the dispense does not exist
    /// - [`DispensaryError::InvalidState`] if it is not PENDING or its
    ///   prescription is canceled
    /// - [`DispensaryError::EmptyDispense`] if it has no lines
    /// - [`DispensaryError::LimitExceeded`] if another dispense completed
    ///   against the same items since these lines were added
    /// - [`DispensaryError::InsufficientStock`] if any medicine is short
    #[tracing::instrument(skip(self, completion), fields(dispensed_by = %completion.dispensed_by))]
    pub async fn complete(
        &self,
        dispense_id: DispenseId,
        completion: Completion,
    ) -> Result<DispenseWithLines> {
        let mut uow = self.env.store.begin().await?;
        let outcome = self
            .complete_in(uow.as_mut(), dispense_id, completion)
            .await;

        match finish(uow, outcome).await {
            Ok(completed) => {
                metrics::counter!("dispensary.dispense.completed").increment(1);
                tracing::info!(
                    prescription_id = %completed.dispense.prescription_id,
                    lines = completed.lines.len(),
                    "Dispense completed"
                );
                dispatch::spawn_publish(
                    self.env.publisher.clone(),
                    PrescriptionReady::new(completed.dispense.prescription_id, dispense_id),
                );
                Ok(completed)
            }
            Err(error) => {
                metrics::counter!("dispensary.dispense.rejected", "reason" => error.reason())
                    .increment(1);
                tracing::info!(error = %error, "Dispense completion rejected");
                Err(error)
            }
        }
    }

    async fn complete_in(
        &self,
        uow: &mut dyn UnitOfWork,
        dispense_id: DispenseId,
        completion: Completion,
    ) -> Result<DispenseWithLines> {
        let mut dispense = uow
            .lock_dispense(dispense_id)
            .await?
            .ok_or_else(|| DispensaryError::not_found("dispense", dispense_id))?;
        if dispense.status != DispenseStatus::Pending {
            return Err(DispensaryError::invalid_state(format!(
                "dispense {dispense_id} is already {}",
                dispense.status
            )));
        }

        let lines = uow.dispense_lines(dispense_id).await?;
        if lines.is_empty() {
            return Err(DispensaryError::EmptyDispense { dispense_id });
        }

        let mut prescription = uow
            .lock_prescription(dispense.prescription_id)
            .await?
            .ok_or_else(|| DispensaryError::not_found("prescription", dispense.prescription_id))?;
        if prescription.status == PrescriptionStatus::Canceled {
            return Err(DispensaryError::invalid_state(format!(
                "prescription {} is canceled",
                prescription.id
            )));
        }

        let items = uow.prescription_items(prescription.id).await?;
        prescription::check_completion_limits(uow, &lines, &items).await?;

        let now = self.env.clock.now();
        let demand = inventory::aggregate_demand(&lines, &items)?;
        let movements = inventory::reserve_and_decrement(uow, &demand, now).await?;
        for movement in &movements {
            tracing::debug!(
                medicine_id = %movement.medicine_id,
                before = %movement.before,
                after = %movement.after,
                "Stock decremented"
            );
        }

        dispense.status = DispenseStatus::Completed;
        dispense.dispensed_at = Some(now);
        dispense.dispensed_by = Some(completion.dispensed_by);
        dispense.updated_at = now;
        uow.update_dispense(&dispense).await?;

        prescription::apply_rollup(uow, &mut prescription, now).await?;

        Ok(DispenseWithLines { dispense, lines })
    }

    /// Read a dispense with its lines.
    ///
    /// # Errors
    ///
    /// Returns [`DispensaryError::NotFound`] if the dispense does not exist.
    pub async fn get_dispense(&self, dispense_id: DispenseId) -> Result<DispenseWithLines> {
        let mut uow = self.env.store.begin().await?;
        let outcome = Self::load_in(uow.as_mut(), dispense_id).await;
        finish(uow, outcome).await
    }

    async fn load_in(uow: &mut dyn UnitOfWork, dispense_id: DispenseId) -> Result<DispenseWithLines> {
        let dispense = uow
            .dispense(dispense_id)
            .await?
            .ok_or_else(|| DispensaryError::not_found("dispense", dispense_id))?;
        let lines = uow.dispense_lines(dispense_id).await?;
        Ok(DispenseWithLines { dispense, lines })
    }
}
