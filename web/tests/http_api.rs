//! HTTP surface tests over the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::http::StatusCode;
use axum_test::{TestResponse, TestServer};
use dispensary_core::{
    DispenseStatus, DispenseWithLines, EncounterId, Medicine, PrescriptionItem,
    PrescriptionStatus, PrescriptionWithItems,
};
use dispensary_runtime::DispensaryEnvironment;
use dispensary_testing::{
    InMemoryStore, RecordingPublisher, StaticEncounterDirectory, test_clock,
};
use dispensary_web::{AppState, REQUEST_ID_HEADER, router};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Api {
    server: TestServer,
    publisher: RecordingPublisher,
}

fn api_with(encounters: StaticEncounterDirectory) -> Api {
    let publisher = RecordingPublisher::new();
    let env = DispensaryEnvironment::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(publisher.clone()),
        Arc::new(encounters),
        Arc::new(test_clock()),
    );
    let server = TestServer::new(router(AppState::new(env))).expect("test server");
    Api { server, publisher }
}

fn api() -> Api {
    api_with(StaticEncounterDirectory::allow_all())
}

impl Api {
    async fn medicine(&self, name: &str, stock: i64) -> Medicine {
        let response = self
            .server
            .post("/api/medicines")
            .json(&json!({ "name": name, "initial_stock": stock }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    async fn prescription(&self, items: &[(&Medicine, i64)]) -> PrescriptionWithItems {
        let items: Vec<Value> = items
            .iter()
            .map(|(medicine, quantity)| {
                json!({ "medicine_id": medicine.id, "quantity_prescribed": quantity })
            })
            .collect();
        let response = self
            .server
            .post("/api/prescriptions")
            .json(&json!({ "encounter_id": EncounterId::new(), "items": items }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    async fn dispense(&self, rx: &PrescriptionWithItems) -> DispenseWithLines {
        let response = self
            .server
            .post("/api/dispenses")
            .json(&json!({ "prescription_id": rx.prescription.id }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    async fn add_line(
        &self,
        dispense: &DispenseWithLines,
        item: &PrescriptionItem,
        quantity: i64,
    ) -> TestResponse {
        self.server
            .post(&format!("/api/dispenses/{}/lines", dispense.dispense.id))
            .json(&json!({
                "prescription_item_id": item.id,
                "quantity_dispensed": quantity,
            }))
            .await
    }

    async fn complete(&self, dispense: &DispenseWithLines) -> TestResponse {
        self.server
            .post(&format!("/api/dispenses/{}/complete", dispense.dispense.id))
            .json(&json!({ "dispensed_by": Uuid::new_v4() }))
            .await
    }
}

#[tokio::test]
async fn health_is_ok() {
    let api = api();

    let response = api.server.get("/health").await;

    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn full_dispense_over_http() {
    let api = api();
    let aspirin = api.medicine("Aspirin", 10).await;
    let rx = api.prescription(&[(&aspirin, 5)]).await;
    let dispense = api.dispense(&rx).await;

    api.add_line(&dispense, &rx.items[0], 5)
        .await
        .assert_status(StatusCode::CREATED);
    let response = api.complete(&dispense).await;

    response.assert_status_ok();
    let completed: DispenseWithLines = response.json();
    assert_eq!(completed.dispense.status, DispenseStatus::Completed);
    assert_eq!(completed.lines.len(), 1);

    let medicine: Medicine = api
        .server
        .get(&format!("/api/medicines/{}", aspirin.id))
        .await
        .json();
    assert_eq!(medicine.stock, Decimal::from(5));

    let prescription: PrescriptionWithItems = api
        .server
        .get(&format!("/api/prescriptions/{}", rx.prescription.id))
        .await
        .json();
    assert_eq!(prescription.prescription.status, PrescriptionStatus::Dispensed);

    assert!(api.publisher.wait_for(1, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn domain_errors_render_code_and_message() {
    let api = api();
    let aspirin = api.medicine("Aspirin", 10).await;
    let rx = api.prescription(&[(&aspirin, 5)]).await;
    let dispense = api.dispense(&rx).await;

    let over_limit = api.add_line(&dispense, &rx.items[0], 6).await;
    over_limit.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = over_limit.json();
    assert_eq!(body["code"], "LIMIT_EXCEEDED");
    assert!(body["message"].as_str().unwrap().contains("Limit exceeded"));

    let empty = api.complete(&dispense).await;
    empty.assert_status(StatusCode::CONFLICT);
    assert_eq!(empty.json::<Value>()["code"], "EMPTY_DISPENSE");

    let missing = api
        .server
        .get(&format!("/api/dispenses/{}", Uuid::new_v4()))
        .await;
    missing.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(missing.json::<Value>()["code"], "NOT_FOUND");
}

#[tokio::test]
async fn insufficient_stock_is_a_conflict() {
    let api = api();
    let scarce = api.medicine("Scarce", 2).await;
    let rx = api.prescription(&[(&scarce, 5)]).await;
    let dispense = api.dispense(&rx).await;
    api.add_line(&dispense, &rx.items[0], 2).await;

    // drain the stock behind the open dispense's back
    let other = api.prescription(&[(&scarce, 2)]).await;
    let competitor = api.dispense(&other).await;
    api.add_line(&competitor, &other.items[0], 2).await;
    api.complete(&competitor).await.assert_status_ok();

    let response = api.complete(&dispense).await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["code"], "INSUFFICIENT_STOCK");
}

#[tokio::test]
async fn unavailable_appointment_service_is_503() {
    let api = api_with(StaticEncounterDirectory::unavailable());
    let aspirin = api.medicine("Aspirin", 10).await;

    let response = api
        .server
        .post("/api/prescriptions")
        .json(&json!({
            "encounter_id": EncounterId::new(),
            "items": [{ "medicine_id": aspirin.id, "quantity_prescribed": 1 }],
        }))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn prescription_edits_over_http() {
    let api = api();
    let aspirin = api.medicine("Aspirin", 10).await;
    let ibuprofen = api.medicine("Ibuprofen", 10).await;
    let rx = api.prescription(&[(&aspirin, 5)]).await;
    let base = format!("/api/prescriptions/{}", rx.prescription.id);

    let patched: PrescriptionWithItems = api
        .server
        .patch(&base)
        .json(&json!({ "notes": "after meals" }))
        .await
        .json();
    assert_eq!(patched.prescription.status, PrescriptionStatus::Updated);
    assert_eq!(patched.prescription.notes.as_deref(), Some("after meals"));

    let added = api
        .server
        .post(&format!("{base}/items"))
        .json(&json!({ "medicine_id": ibuprofen.id, "quantity_prescribed": 2 }))
        .await;
    added.assert_status(StatusCode::CREATED);
    assert_eq!(added.json::<PrescriptionWithItems>().items.len(), 2);

    let removed: PrescriptionWithItems = api
        .server
        .delete(&format!("{base}/items/{}", rx.items[0].id))
        .await
        .json();
    assert_eq!(removed.items.len(), 1);

    let canceled: PrescriptionWithItems = api
        .server
        .post(&format!("{base}/cancel"))
        .json(&json!({ "reason": "duplicate", "canceled_by": Uuid::new_v4() }))
        .await
        .json();
    assert_eq!(canceled.prescription.status, PrescriptionStatus::Canceled);

    let blocked = api
        .server
        .post("/api/dispenses")
        .json(&json!({ "prescription_id": rx.prescription.id }))
        .await;
    blocked.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn restock_and_validation() {
    let api = api();
    let aspirin = api.medicine("Aspirin", 1).await;

    let restocked = api
        .server
        .post(&format!("/api/medicines/{}/restock", aspirin.id))
        .json(&json!({ "quantity": "2.5" }))
        .await;
    restocked.assert_status_ok();
    assert_eq!(restocked.json::<Medicine>().stock, Decimal::new(35, 1));

    let zero = api
        .server
        .post(&format!("/api/medicines/{}/restock", aspirin.id))
        .json(&json!({ "quantity": 0 }))
        .await;
    zero.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(zero.json::<Value>()["code"], "VALIDATION_ERROR");

    let too_precise = api
        .server
        .post(&format!("/api/medicines/{}/restock", aspirin.id))
        .json(&json!({ "quantity": "0.0004" }))
        .await;
    too_precise.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(too_precise.json::<Value>()["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let api = api();

    let response = api.server.get("/health").await;

    let id = response.header(REQUEST_ID_HEADER);
    assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
}
