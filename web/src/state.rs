//! Application state for Axum handlers.

use dispensary_runtime::{
    DispensaryEnvironment, DispenseWorkflow, MedicineService, PrescriptionService,
};

/// Services shared across all HTTP handlers.
///
/// Every field is a cheap handle over the same [`DispensaryEnvironment`], so
/// cloning per request is fine.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Dispense workflow
    pub dispenses: DispenseWorkflow,
    /// Prescription edits
    pub prescriptions: PrescriptionService,
    /// Medicine registration and restock
    pub medicines: MedicineService,
}

impl AppState {
    /// Build every service over one environment.
    #[must_use]
    pub fn new(env: DispensaryEnvironment) -> Self {
        Self {
            dispenses: DispenseWorkflow::new(env.clone()),
            prescriptions: PrescriptionService::new(env.clone()),
            medicines: MedicineService::new(env),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
