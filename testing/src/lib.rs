//! # Dispensary Testing
//!
//! Test doubles for the dispensary environment.
//!
//! This crate provides:
//! - [`InMemoryStore`]: transactional in-memory [`DispensaryStore`](dispensary_core::store::DispensaryStore)
//! - [`RecordingPublisher`] and [`FailingPublisher`]: event publisher mocks
//! - [`StaticEncounterDirectory`]: encounter lookup without a network
//! - [`FixedClock`]: deterministic time
//! - [`fixtures`]: input builders
//!
//! ## Example
//!
//! ```ignore
//! use dispensary_testing::{InMemoryStore, RecordingPublisher, test_clock};
//!
//! #[tokio::test]
//! async fn completes() {
//!     let store = InMemoryStore::new();
//!     let aspirin = store.seed_medicine("Aspirin", Decimal::from(10)).await;
//!     // build an environment around `store` and drive the workflow
//! }
//! ```

use chrono::{DateTime, Utc};
use dispensary_core::environment::Clock;

mod encounters;
pub mod fixtures;
mod publishers;
mod store;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use dispensary_testing::mocks::FixedClock;
    /// use dispensary_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use encounters::StaticEncounterDirectory;
pub use mocks::{FixedClock, test_clock};
pub use publishers::{FailingPublisher, RecordingPublisher};
pub use store::{InMemoryStore, InMemoryUnitOfWork};
