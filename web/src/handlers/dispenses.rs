//! Dispense endpoints.
//!
//! ```text
//! POST /api/dispenses                 open a dispense
//! GET  /api/dispenses/:id             dispense with lines
//! POST /api/dispenses/:id/lines       append a line
//! POST /api/dispenses/:id/complete    decrement stock and close
//! ```

use crate::{AppState, WebResult};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use dispensary_core::{DispenseId, DispenseWithLines};
use dispensary_runtime::{Completion, NewDispense, NewDispenseLine};

/// Open a PENDING dispense for a prescription.
///
/// # Errors
///
/// 404 for an unknown prescription, 409 if it is dispensed or canceled.
pub async fn create_dispense(
    State(state): State<AppState>,
    Json(request): Json<NewDispense>,
) -> WebResult<(StatusCode, Json<DispenseWithLines>)> {
    let dispense = state.dispenses.create_dispense(request).await?;
    Ok((StatusCode::CREATED, Json(dispense)))
}

/// Fetch a dispense with its lines.
///
/// # Errors
///
/// 404 for an unknown dispense.
pub async fn get_dispense(
    State(state): State<AppState>,
    Path(id): Path<DispenseId>,
) -> WebResult<Json<DispenseWithLines>> {
    Ok(Json(state.dispenses.get_dispense(id).await?))
}

/// Append a line to a PENDING dispense.
///
/// # Errors
///
/// 404 for an unknown dispense or item, 409 if the dispense is completed,
/// 422 for a bad quantity or one that would exceed the prescribed amount.
pub async fn add_line(
    State(state): State<AppState>,
    Path(id): Path<DispenseId>,
    Json(line): Json<NewDispenseLine>,
) -> WebResult<(StatusCode, Json<DispenseWithLines>)> {
    let dispense = state.dispenses.add_line(id, line).await?;
    Ok((StatusCode::CREATED, Json(dispense)))
}

/// Complete a dispense.
///
/// # Errors
///
/// 409 if the dispense is completed, empty, or stock is short; 422 when a
/// concurrent completion already used up the prescribed amount.
pub async fn complete_dispense(
    State(state): State<AppState>,
    Path(id): Path<DispenseId>,
    Json(completion): Json<Completion>,
) -> WebResult<Json<DispenseWithLines>> {
    Ok(Json(state.dispenses.complete(id, completion).await?))
}
