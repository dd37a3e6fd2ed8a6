//! Medicine registration and restocking.

use crate::{DispensaryEnvironment, finish};
use dispensary_core::inventory::{self, NewMedicine};
use dispensary_core::{DispensaryError, Medicine, MedicineId, Result};
use rust_decimal::Decimal;

/// Stock administration on top of the inventory ledger.
#[derive(Clone, Debug)]
pub struct MedicineService {
    env: DispensaryEnvironment,
}

impl MedicineService {
    /// Create a service over `env`
    #[must_use]
    pub const fn new(env: DispensaryEnvironment) -> Self {
        Self { env }
    }

    /// Register a medicine with its opening stock.
    ///
    /// # Errors
    ///
    /// Returns [`DispensaryError::Validation`] for a blank name or negative stock.
    #[tracing::instrument(skip(self, input), fields(name = %input.name, initial_stock = %input.initial_stock))]
    pub async fn register(&self, input: NewMedicine) -> Result<Medicine> {
        let mut uow = self.env.store.begin().await?;
        let outcome = inventory::register_medicine(uow.as_mut(), input, self.env.clock.now()).await;
        let medicine = finish(uow, outcome).await?;

        tracing::info!(medicine_id = %medicine.id, "Medicine registered");
        Ok(medicine)
    }

    /// Add received stock.
    ///
    /// # Errors
    ///
    /// - [`DispensaryError::Validation`] if `quantity` is not positive
    /// - [`DispensaryError::NotFound`] if the medicine does not exist
    #[tracing::instrument(skip(self, quantity), fields(quantity = %quantity))]
    pub async fn receive_stock(&self, id: MedicineId, quantity: Decimal) -> Result<Medicine> {
        let mut uow = self.env.store.begin().await?;
        let outcome =
            inventory::receive_stock(uow.as_mut(), id, quantity, self.env.clock.now()).await;
        let medicine = finish(uow, outcome).await?;

        tracing::info!(stock = %medicine.stock, "Stock received");
        Ok(medicine)
    }

    /// Read a medicine.
    ///
    /// # Errors
    ///
    /// Returns [`DispensaryError::NotFound`] if it does not exist.
    pub async fn get(&self, id: MedicineId) -> Result<Medicine> {
        let mut uow = self.env.store.begin().await?;
        let outcome = match uow.medicine(id).await {
            Ok(Some(medicine)) => Ok(medicine),
            Ok(None) => Err(DispensaryError::not_found("medicine", id)),
            Err(error) => Err(error.into()),
        };
        finish(uow, outcome).await
    }
}
