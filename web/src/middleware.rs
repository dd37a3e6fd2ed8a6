//! Request-id middleware.
//!
//! Every request runs inside an `http_request` span carrying a request id.
//! The id comes from the `X-Request-ID` header when it holds a UUID, otherwise
//! a fresh one is generated. It is stored in the request extensions and echoed
//! back on the response.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/api/dispenses", post(create_dispense))
//!     .layer(axum::middleware::from_fn(request_id));
//! ```

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for the request id.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Request id assigned by [`request_id`], readable with `Extension<RequestId>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

/// Attach a request id, trace the request under it, and echo it back.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    req.extensions_mut().insert(RequestId(id));

    let span = tracing::info_span!(
        "http_request",
        request_id = %id,
        method = %req.method(),
        uri = %req.uri(),
    );

    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
