//! Medicine endpoints.

use crate::{AppState, WebResult};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use dispensary_core::inventory::NewMedicine;
use dispensary_core::{Medicine, MedicineId};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Body of `POST /api/medicines/:id/restock`.
#[derive(Debug, Deserialize)]
pub struct Restock {
    /// Quantity received, must be positive
    pub quantity: Decimal,
}

/// `POST /api/medicines`
///
/// # Errors
///
/// 422 for a blank name or negative opening stock.
pub async fn register_medicine(
    State(state): State<AppState>,
    Json(input): Json<NewMedicine>,
) -> WebResult<(StatusCode, Json<Medicine>)> {
    let medicine = state.medicines.register(input).await?;
    Ok((StatusCode::CREATED, Json(medicine)))
}

/// `GET /api/medicines/:id`
///
/// # Errors
///
/// 404 for an unknown medicine.
pub async fn get_medicine(
    State(state): State<AppState>,
    Path(id): Path<MedicineId>,
) -> WebResult<Json<Medicine>> {
    Ok(Json(state.medicines.get(id).await?))
}

/// `POST /api/medicines/:id/restock`
///
/// # Errors
///
/// 404 for an unknown medicine, 422 for a non-positive quantity.
pub async fn restock_medicine(
    State(state): State<AppState>,
    Path(id): Path<MedicineId>,
    Json(restock): Json<Restock>,
) -> WebResult<Json<Medicine>> {
    Ok(Json(state.medicines.receive_stock(id, restock.quantity).await?))
}
