//! # Dispensary Runtime
//!
//! Executes dispensary operations against an injected
//! [`DispensaryEnvironment`].
//!
//! Each operation opens exactly one unit of work, runs the core rules inside
//! it, and commits on success or rolls back on any error. Side effects that
//! must not influence the outcome (the `prescription_ready` event) run after
//! commit on a spawned task.
//!
//! - [`DispenseWorkflow`]: create, add lines, complete, read
//! - [`PrescriptionService`]: create (with encounter lookup), edit, cancel
//! - [`MedicineService`]: register, restock, read
//!
//! ## Metrics
//!
//! - `dispensary.dispense.completed` (counter)
//! - `dispensary.dispense.rejected` (counter, label `reason`)
//! - `dispensary.publish.failed` (counter)

use dispensary_core::Result;
use dispensary_core::environment::Clock;
use dispensary_core::encounter::EncounterDirectory;
use dispensary_core::event::EventPublisher;
use dispensary_core::store::{DispensaryStore, UnitOfWork};
use std::sync::Arc;

pub mod dispatch;
pub mod dispense;
pub mod medicines;
pub mod prescriptions;

pub use dispense::{Completion, DispenseWorkflow, NewDispense, NewDispenseLine};
pub use medicines::MedicineService;
pub use prescriptions::PrescriptionService;

/// Collaborators every service needs.
///
/// Cheap to clone; all fields are shared handles.
#[derive(Clone)]
pub struct DispensaryEnvironment {
    /// Unit-of-work factory
    pub store: Arc<dyn DispensaryStore>,
    /// Event delivery
    pub publisher: Arc<dyn EventPublisher>,
    /// Encounter lookup
    pub encounters: Arc<dyn EncounterDirectory>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl DispensaryEnvironment {
    /// Assemble an environment.
    pub fn new(
        store: Arc<dyn DispensaryStore>,
        publisher: Arc<dyn EventPublisher>,
        encounters: Arc<dyn EncounterDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            publisher,
            encounters,
            clock,
        }
    }
}

impl std::fmt::Debug for DispensaryEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispensaryEnvironment").finish_non_exhaustive()
    }
}

/// Commit on success, roll back on failure.
///
/// A rollback failure is logged and the original error returned; the
/// backend discards the unit when it is dropped either way.
pub(crate) async fn finish<T>(mut uow: Box<dyn UnitOfWork>, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = uow.rollback().await {
                tracing::warn!(error = %rollback_error, "Rollback failed");
            }
            Err(error)
        }
    }
}
