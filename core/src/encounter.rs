//! Lookup of encounters (appointments) owned by an upstream service.
//!
//! Prescription creation verifies its encounter reference here. A lookup that
//! cannot be answered is an error, never a silent success.

use crate::types::EncounterId;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Failures talking to the encounter service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncounterLookupError {
    /// The request did not finish in time
    #[error("request timed out")]
    Timeout,

    /// The service could not be reached
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with an unexpected status
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),
}

/// Answers whether an encounter exists.
pub trait EncounterDirectory: Send + Sync {
    /// `Ok(true)` if the encounter exists, `Ok(false)` if the service
    /// reports it missing.
    ///
    /// # Errors
    ///
    /// Returns [`EncounterLookupError`] when the service cannot give an answer.
    fn encounter_exists(
        &self,
        id: EncounterId,
    ) -> Pin<Box<dyn Future<Output = Result<bool, EncounterLookupError>> + Send + '_>>;
}
