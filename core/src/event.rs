//! Downstream notification of completed dispenses.
//!
//! After a dispense completes and its unit of work commits, a
//! [`PrescriptionReady`] event is handed to an [`EventPublisher`]. Delivery is
//! best-effort and at-most-once: the publisher is called exactly one time per
//! completion, and a [`PublishError`] is logged by the caller and never undoes
//! the completion.

use crate::types::{DispenseId, PrescriptionId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// "Prescription ready for pickup" fact.
///
/// Serializes to
/// `{"event_type":"prescription_ready","prescription_id":...,"dispense_id":...,"status":"READY"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriptionReady {
    /// Always [`PrescriptionReady::EVENT_TYPE`]
    pub event_type: String,
    /// Prescription the dispense belongs to
    pub prescription_id: PrescriptionId,
    /// The completed dispense
    pub dispense_id: DispenseId,
    /// Always [`PrescriptionReady::READY`]
    pub status: String,
}

impl PrescriptionReady {
    /// Value of the `event_type` field.
    pub const EVENT_TYPE: &'static str = "prescription_ready";
    /// Value of the `status` field.
    pub const READY: &'static str = "READY";

    /// Build the event for a completed dispense.
    #[must_use]
    pub fn new(prescription_id: PrescriptionId, dispense_id: DispenseId) -> Self {
        Self {
            event_type: Self::EVENT_TYPE.to_string(),
            prescription_id,
            dispense_id,
            status: Self::READY.to_string(),
        }
    }

    /// Serialize to the JSON wire payload.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Serialization`] if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, PublishError> {
        serde_json::to_vec(self).map_err(|e| PublishError::Serialization(e.to_string()))
    }
}

/// Errors raised while delivering an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Could not reach the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Topic or queue could not be declared
    #[error("Topic setup failed for '{topic}': {reason}")]
    TopicSetup {
        /// Target topic
        topic: String,
        /// Failure detail
        reason: String,
    },

    /// The broker did not accept the message
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// Target topic
        topic: String,
        /// Failure detail
        reason: String,
    },

    /// The payload could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Delivers [`PrescriptionReady`] events to a broker.
///
/// # Dyn Compatibility
///
/// Returns `Pin<Box<dyn Future>>` so the runtime can hold an
/// `Arc<dyn EventPublisher>` and move it into a spawned task.
pub trait EventPublisher: Send + Sync {
    /// Publish one event. Implementations must not retry.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the event could not be delivered.
    fn publish(
        &self,
        event: &PrescriptionReady,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>>;
}
