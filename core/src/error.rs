//! Error taxonomy for dispensary operations.
//!
//! Every operation returns [`DispensaryError`]. All variants abort the
//! operation's unit of work, so a failed call leaves no partial state behind.
//! Publish failures are not part of this enum: they happen after commit and
//! are only logged (see [`crate::event::PublishError`]).

use crate::encounter::EncounterLookupError;
use crate::store::StoreError;
use crate::types::{DispenseId, MedicineId, PrescriptionItemId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result alias used throughout the dispensary crates.
pub type Result<T> = std::result::Result<T, DispensaryError>;

/// Errors surfaced to callers of dispensary operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispensaryError {
    /// A referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind ("dispense", "prescription", ...)
        entity: &'static str,
        /// Requested identifier
        id: String,
    },

    /// The entity is not in a state that allows the operation
    #[error("Invalid state: {message}")]
    InvalidState {
        /// What was wrong
        message: String,
    },

    /// Completion was requested for a dispense without lines
    #[error("Dispense {dispense_id} has no lines")]
    EmptyDispense {
        /// The empty dispense
        dispense_id: DispenseId,
    },

    /// Structurally invalid input
    #[error("Validation failed: {message}")]
    Validation {
        /// What was wrong
        message: String,
    },

    /// More would be dispensed than prescribed
    #[error(
        "Limit exceeded for prescription item {item_id}: prescribed {prescribed}, requested total {requested_total}"
    )]
    LimitExceeded {
        /// Prescription item over its limit
        item_id: PrescriptionItemId,
        /// Prescribed quantity
        prescribed: Decimal,
        /// Total that would have been dispensed
        requested_total: Decimal,
    },

    /// Not enough stock for a medicine
    #[error(
        "Insufficient stock for medicine {medicine_id}: required {required}, available {available}"
    )]
    InsufficientStock {
        /// Medicine short on stock
        medicine_id: MedicineId,
        /// Quantity needed
        required: Decimal,
        /// Quantity on hand
        available: Decimal,
    },

    /// A dependency could not be reached or answered with an error
    #[error("{service} unavailable: {reason}")]
    UpstreamUnavailable {
        /// Name of the dependency
        service: &'static str,
        /// Failure detail
        reason: String,
    },

    /// Storage backend failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coarse classification of [`DispensaryError`], used by transports to pick a
/// status code and by metrics as a label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Entity missing
    NotFound,
    /// Wrong entity state (includes empty dispenses)
    InvalidState,
    /// Bad input
    Validation,
    /// Over the prescribed quantity
    LimitExceeded,
    /// Not enough stock
    InsufficientStock,
    /// Dependency unreachable
    UpstreamUnavailable,
    /// Storage failure
    Store,
}

impl ErrorKind {
    /// Stable snake_case label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::Validation => "validation",
            Self::LimitExceeded => "limit_exceeded",
            Self::InsufficientStock => "insufficient_stock",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Store => "store",
        }
    }
}

impl DispensaryError {
    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState { .. } | Self::EmptyDispense { .. } => ErrorKind::InvalidState,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// Metric label for rejected operations. Narrower than [`Self::kind`].
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::EmptyDispense { .. } => "empty_dispense",
            other => other.kind().as_str(),
        }
    }
}

impl From<EncounterLookupError> for DispensaryError {
    fn from(error: EncounterLookupError) -> Self {
        Self::UpstreamUnavailable {
            service: "appointment service",
            reason: error.to_string(),
        }
    }
}
