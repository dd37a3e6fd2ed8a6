//! # Dispensary Core
//!
//! Domain model and business rules for dispensing medication against
//! prescriptions.
//!
//! This crate has no I/O of its own. Persistence, event delivery and the
//! encounter lookup sit behind traits that the runtime receives through its
//! environment:
//!
//! - [`store::DispensaryStore`] opens a [`store::UnitOfWork`], the
//!   transactional boundary every operation runs inside
//! - [`event::EventPublisher`] delivers `prescription_ready` notifications
//! - [`encounter::EncounterDirectory`] verifies encounter references
//! - [`environment::Clock`] supplies timestamps
//!
//! ## Rules implemented here
//!
//! - [`inventory`]: stock aggregation per medicine, all-or-nothing
//!   reservation under row locks, stock receipts
//! - [`prescription`]: dispensed-quantity sums, per-line limit checks,
//!   status rollup after a completed dispense
//! - [`quantities`]: scale and magnitude bounds shared by every quantity
//!
//! ## Example
//!
//! ```ignore
//! use dispensary_core::inventory;
//!
//! let mut uow = store.begin().await?;
//! let lines = uow.dispense_lines(dispense_id).await?;
//! let items = uow.prescription_items(prescription_id).await?;
//! let demand = inventory::aggregate_demand(&lines, &items)?;
//! inventory::reserve_and_decrement(uow.as_mut(), &demand, now).await?;
//! uow.commit().await?;
//! ```

pub mod encounter;
pub mod error;
pub mod event;
pub mod inventory;
pub mod prescription;
pub mod quantities;
pub mod store;
pub mod types;

pub use error::{DispensaryError, ErrorKind, Result};
pub use types::*;

/// Dependencies injected from the outside world.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock used in production.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
