//! `HttpEncounterDirectory` against a local stub of the appointment service.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::{Router, extract::Path, http::StatusCode, routing::get};
use dispensary_core::EncounterId;
use dispensary_core::encounter::{EncounterDirectory, EncounterLookupError};
use dispensary_server::HttpEncounterDirectory;
use std::time::Duration;

/// Serve a stub answering 200 for `known`, 500 for `broken`, a slow reply for
/// `slow`, and 404 for everything else.
async fn stub(known: EncounterId, broken: EncounterId, slow: EncounterId) -> String {
    let app = Router::new().route(
        "/appointments/:id",
        get(move |Path(id): Path<EncounterId>| async move {
            if id == known {
                (StatusCode::OK, "{}")
            } else if id == broken {
                (StatusCode::INTERNAL_SERVER_ERROR, "boom")
            } else if id == slow {
                tokio::time::sleep(Duration::from_secs(2)).await;
                (StatusCode::OK, "{}")
            } else {
                (StatusCode::NOT_FOUND, "")
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{address}")
}

#[tokio::test]
async fn lookup_maps_statuses() {
    let (known, broken, slow) = (EncounterId::new(), EncounterId::new(), EncounterId::new());
    let base_url = stub(known, broken, slow).await;
    let directory = HttpEncounterDirectory::new(base_url, Duration::from_millis(300))
        .expect("client should build");

    assert_eq!(directory.encounter_exists(known).await, Ok(true));
    assert_eq!(directory.encounter_exists(EncounterId::new()).await, Ok(false));
    assert_eq!(
        directory.encounter_exists(broken).await,
        Err(EncounterLookupError::UnexpectedStatus(500))
    );
    assert_eq!(
        directory.encounter_exists(slow).await,
        Err(EncounterLookupError::Timeout)
    );
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let directory = HttpEncounterDirectory::new("http://127.0.0.1:1", Duration::from_secs(1))
        .expect("client should build");

    let result = directory.encounter_exists(EncounterId::new()).await;

    assert!(matches!(result, Err(EncounterLookupError::Transport(_))));
}
