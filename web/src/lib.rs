//! HTTP transport for the dispensary.
//!
//! A thin axum layer over the runtime services: handlers deserialize the
//! request, call one service operation, and map the result. Domain errors
//! become HTTP responses through [`AppError`].
//!
//! # Routes
//!
//! ```text
//! POST   /api/dispenses
//! GET    /api/dispenses/:id
//! POST   /api/dispenses/:id/lines
//! POST   /api/dispenses/:id/complete
//! POST   /api/prescriptions
//! GET    /api/prescriptions/:id
//! PATCH  /api/prescriptions/:id
//! POST   /api/prescriptions/:id/items
//! DELETE /api/prescriptions/:id/items/:item_id
//! POST   /api/prescriptions/:id/cancel
//! POST   /api/medicines
//! GET    /api/medicines/:id
//! POST   /api/medicines/:id/restock
//! GET    /health
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dispensary_web::{AppState, router};
//!
//! let app = router(AppState::new(env));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8022").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{delete, get, post},
};
use handlers::{dispenses, medicines, prescriptions};
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use middleware::{REQUEST_ID_HEADER, RequestId, request_id};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/dispenses", post(dispenses::create_dispense))
        .route("/dispenses/:id", get(dispenses::get_dispense))
        .route("/dispenses/:id/lines", post(dispenses::add_line))
        .route("/dispenses/:id/complete", post(dispenses::complete_dispense))
        .route("/prescriptions", post(prescriptions::create_prescription))
        .route(
            "/prescriptions/:id",
            get(prescriptions::get_prescription).patch(prescriptions::update_prescription),
        )
        .route("/prescriptions/:id/items", post(prescriptions::add_item))
        .route(
            "/prescriptions/:id/items/:item_id",
            delete(prescriptions::remove_item),
        )
        .route(
            "/prescriptions/:id/cancel",
            post(prescriptions::cancel_prescription),
        )
        .route("/medicines", post(medicines::register_medicine))
        .route("/medicines/:id", get(medicines::get_medicine))
        .route("/medicines/:id/restock", post(medicines::restock_medicine));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id))
        .with_state(state)
}
