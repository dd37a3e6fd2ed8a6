//! Prescription endpoints.

use crate::{AppState, WebResult};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use dispensary_core::prescription::{Cancellation, NewPrescription, PrescriptionUpdate};
use dispensary_core::{
    NewPrescriptionItem, PrescriptionId, PrescriptionItemId, PrescriptionWithItems,
};

/// `POST /api/prescriptions`
///
/// # Errors
///
/// 422 for missing items or bad quantities, 404 for an unknown encounter or
/// medicine, 503 when the appointment service cannot answer.
pub async fn create_prescription(
    State(state): State<AppState>,
    Json(input): Json<NewPrescription>,
) -> WebResult<(StatusCode, Json<PrescriptionWithItems>)> {
    let created = state.prescriptions.create(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/prescriptions/:id`
///
/// # Errors
///
/// 404 for an unknown prescription.
pub async fn get_prescription(
    State(state): State<AppState>,
    Path(id): Path<PrescriptionId>,
) -> WebResult<Json<PrescriptionWithItems>> {
    Ok(Json(state.prescriptions.get(id).await?))
}

/// `PATCH /api/prescriptions/:id`
///
/// # Errors
///
/// 404 for an unknown prescription, 409 if it is canceled.
pub async fn update_prescription(
    State(state): State<AppState>,
    Path(id): Path<PrescriptionId>,
    Json(changes): Json<PrescriptionUpdate>,
) -> WebResult<Json<PrescriptionWithItems>> {
    Ok(Json(state.prescriptions.update(id, changes).await?))
}

/// `POST /api/prescriptions/:id/items`
///
/// # Errors
///
/// 404 for an unknown prescription or medicine, 409 if it is canceled or
/// dispensed, 422 for a bad quantity.
pub async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<PrescriptionId>,
    Json(item): Json<NewPrescriptionItem>,
) -> WebResult<(StatusCode, Json<PrescriptionWithItems>)> {
    let updated = state.prescriptions.add_item(id, item).await?;
    Ok((StatusCode::CREATED, Json(updated)))
}

/// `DELETE /api/prescriptions/:id/items/:item_id`
///
/// # Errors
///
/// 404 for an unknown prescription or item, 409 if the item has been
/// dispensed against.
pub async fn remove_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(PrescriptionId, PrescriptionItemId)>,
) -> WebResult<Json<PrescriptionWithItems>> {
    Ok(Json(state.prescriptions.remove_item(id, item_id).await?))
}

/// `POST /api/prescriptions/:id/cancel`
///
/// # Errors
///
/// 404 for an unknown prescription, 409 if it has been fully dispensed.
pub async fn cancel_prescription(
    State(state): State<AppState>,
    Path(id): Path<PrescriptionId>,
    Json(cancellation): Json<Cancellation>,
) -> WebResult<Json<PrescriptionWithItems>> {
    Ok(Json(state.prescriptions.cancel(id, cancellation).await?))
}
