//! Error types for web handlers.
//!
//! [`AppError`] bridges [`DispensaryError`] and HTTP responses by
//! implementing Axum's `IntoResponse`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dispensary_core::DispensaryError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// Renders as `{"code": ..., "message": ...}` with the matching status.
/// Server errors keep their cause in `source` for logging; clients only see a
/// generic message.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Medicine>, AppError> {
///     let medicine = state.medicines.get(id).await?;
///     Ok(Json(medicine))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            message.into(),
            "NOT_FOUND".to_string(),
        )
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), code.into())
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn unprocessable(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message.into(), code.into())
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }

    /// HTTP status this error renders with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Map the dispensary error taxonomy onto HTTP.
///
/// | Error | Status |
/// |---|---|
/// | `NotFound` | 404 |
/// | `InvalidState`, `EmptyDispense` | 409 |
/// | `Validation`, `LimitExceeded` | 422 |
/// | `InsufficientStock` | 409 |
/// | `UpstreamUnavailable` | 503 |
/// | `Store` | 500 |
impl From<DispensaryError> for AppError {
    fn from(err: DispensaryError) -> Self {
        let message = err.to_string();
        match err {
            DispensaryError::NotFound { .. } => Self::not_found(message),
            DispensaryError::InvalidState { .. } => Self::conflict(message, "INVALID_STATE"),
            DispensaryError::EmptyDispense { .. } => Self::conflict(message, "EMPTY_DISPENSE"),
            DispensaryError::InsufficientStock { .. } => {
                Self::conflict(message, "INSUFFICIENT_STOCK")
            },
            DispensaryError::Validation { .. } => Self::unprocessable(message, "VALIDATION_ERROR"),
            DispensaryError::LimitExceeded { .. } => {
                Self::unprocessable(message, "LIMIT_EXCEEDED")
            },
            DispensaryError::UpstreamUnavailable { .. } => Self::unavailable(message),
            DispensaryError::Store(_) => {
                Self::internal("An internal error occurred").with_source(anyhow::Error::new(err))
            },
        }
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispensary_core::store::StoreError;
    use dispensary_core::{DispenseId, MedicineId, PrescriptionItemId};
    use rust_decimal::Decimal;

    #[test]
    fn test_error_display() {
        let err = AppError::not_found("medicine not found: 42");
        assert_eq!(err.to_string(), "[NOT_FOUND] medicine not found: 42");
    }

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (DispensaryError::not_found("dispense", "x"), StatusCode::NOT_FOUND),
            (DispensaryError::invalid_state("completed"), StatusCode::CONFLICT),
            (
                DispensaryError::EmptyDispense {
                    dispense_id: DispenseId::new(),
                },
                StatusCode::CONFLICT,
            ),
            (
                DispensaryError::validation("quantity"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                DispensaryError::LimitExceeded {
                    item_id: PrescriptionItemId::new(),
                    prescribed: Decimal::ONE,
                    requested_total: Decimal::TWO,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                DispensaryError::InsufficientStock {
                    medicine_id: MedicineId::new(),
                    required: Decimal::TWO,
                    available: Decimal::ONE,
                },
                StatusCode::CONFLICT,
            ),
            (
                DispensaryError::UpstreamUnavailable {
                    service: "appointment service",
                    reason: "timeout".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                DispensaryError::Store(StoreError::DatabaseError("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(AppError::from(error).status(), status);
        }
    }

    #[test]
    fn store_errors_hide_their_detail() {
        let err = AppError::from(DispensaryError::Store(StoreError::DatabaseError(
            "password authentication failed".into(),
        )));

        assert_eq!(err.code(), "INTERNAL_SERVER_ERROR");
        assert_eq!(err.message, "An internal error occurred");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn empty_dispense_has_its_own_code() {
        let err = AppError::from(DispensaryError::EmptyDispense {
            dispense_id: DispenseId::new(),
        });
        assert_eq!(err.code(), "EMPTY_DISPENSE");
    }
}
