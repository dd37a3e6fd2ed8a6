//! Prescription service.

use crate::{DispensaryEnvironment, finish};
use dispensary_core::prescription::{self, Cancellation, NewPrescription, PrescriptionUpdate};
use dispensary_core::{
    DispensaryError, NewPrescriptionItem, PrescriptionId, PrescriptionItemId,
    PrescriptionWithItems, Result,
};

/// Writes and reads prescriptions.
#[derive(Clone, Debug)]
pub struct PrescriptionService {
    env: DispensaryEnvironment,
}

impl PrescriptionService {
    /// Create a service over `env`
    #[must_use]
    pub const fn new(env: DispensaryEnvironment) -> Self {
        Self { env }
    }

    /// Create a prescription with its items.
    ///
    /// The encounter is looked up before any unit of work is opened, so a
    /// slow upstream never holds database locks.
    ///
    /// # Errors
    ///
    /// - [`DispensaryError::UpstreamUnavailable`] if the encounter service
    ///   cannot answer
    /// - [`DispensaryError::NotFound`] if the encounter or a medicine does not exist
    /// - [`DispensaryError::Validation`] for an empty item list or a
    ///   non-positive quantity
    #[tracing::instrument(skip(self, input), fields(encounter_id = %input.encounter_id, items = input.items.len()))]
    pub async fn create(&self, input: NewPrescription) -> Result<PrescriptionWithItems> {
        let encounter_id = input.encounter_id;
        if !self.env.encounters.encounter_exists(encounter_id).await? {
            return Err(DispensaryError::not_found("encounter", encounter_id));
        }

        let mut uow = self.env.store.begin().await?;
        let outcome = prescription::create(uow.as_mut(), input, self.env.clock.now()).await;
        let created = finish(uow, outcome).await?;

        tracing::info!(prescription_id = %created.prescription.id, "Prescription created");
        Ok(created)
    }

    /// Read a prescription with its items.
    ///
    /// # Errors
    ///
    /// Returns [`DispensaryError::NotFound`] if it does not exist.
    pub async fn get(&self, id: PrescriptionId) -> Result<PrescriptionWithItems> {
        let mut uow = self.env.store.begin().await?;
        let outcome = prescription::load_with_items(uow.as_mut(), id).await;
        finish(uow, outcome).await
    }

    /// Change validity or notes.
    ///
    /// # Errors
    ///
    /// - [`DispensaryError::NotFound`] if it does not exist
    /// - [`DispensaryError::InvalidState`] if it is canceled
    #[tracing::instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: PrescriptionId,
        changes: PrescriptionUpdate,
    ) -> Result<PrescriptionWithItems> {
        let mut uow = self.env.store.begin().await?;
        let outcome = prescription::update(uow.as_mut(), id, changes, self.env.clock.now()).await;
        finish(uow, outcome).await
    }

    /// Add an item.
    ///
    /// # Errors
    ///
    /// - [`DispensaryError::NotFound`] if the prescription or medicine does not exist
    /// - [`DispensaryError::InvalidState`] if it is canceled or dispensed
    /// - [`DispensaryError::Validation`] for a non-positive quantity
    #[tracing::instrument(skip(self, item), fields(medicine_id = %item.medicine_id))]
    pub async fn add_item(
        &self,
        id: PrescriptionId,
        item: NewPrescriptionItem,
    ) -> Result<PrescriptionWithItems> {
        let mut uow = self.env.store.begin().await?;
        let outcome = prescription::add_item(uow.as_mut(), id, item, self.env.clock.now()).await;
        finish(uow, outcome).await
    }

    /// Remove an item nothing has been dispensed against.
    ///
    /// # Errors
    ///
    /// - [`DispensaryError::NotFound`] if the prescription or item does not exist
    /// - [`DispensaryError::InvalidState`] if it is canceled or dispensed, or
    ///   the item has dispense lines
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        id: PrescriptionId,
        item_id: PrescriptionItemId,
    ) -> Result<PrescriptionWithItems> {
        let mut uow = self.env.store.begin().await?;
        let outcome =
            prescription::remove_item(uow.as_mut(), id, item_id, self.env.clock.now()).await;
        finish(uow, outcome).await
    }

    /// Cancel. Cancelling a canceled prescription returns it unchanged.
    ///
    /// # Errors
    ///
    /// - [`DispensaryError::NotFound`] if it does not exist
    /// - [`DispensaryError::InvalidState`] if it has been fully dispensed
    #[tracing::instrument(skip(self, cancellation), fields(canceled_by = %cancellation.canceled_by))]
    pub async fn cancel(
        &self,
        id: PrescriptionId,
        cancellation: Cancellation,
    ) -> Result<PrescriptionWithItems> {
        let mut uow = self.env.store.begin().await?;
        let outcome =
            prescription::cancel(uow.as_mut(), id, cancellation, self.env.clock.now()).await;
        let canceled = finish(uow, outcome).await?;

        tracing::info!("Prescription canceled");
        Ok(canceled)
    }
}
