//! Prescription and medicine service tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use common::{harness, harness_with};
use dispensary_core::inventory::NewMedicine;
use dispensary_core::prescription::{Cancellation, PrescriptionUpdate};
use dispensary_core::{
    ActorId, EncounterId, ErrorKind, MedicineId, NewPrescriptionItem, PrescriptionItemId,
    PrescriptionStatus,
};
use dispensary_runtime::NewDispense;
use dispensary_testing::fixtures::{new_prescription, qty};
use dispensary_testing::{RecordingPublisher, StaticEncounterDirectory};
use rust_decimal::Decimal;
use std::sync::Arc;

fn cancellation() -> Cancellation {
    Cancellation {
        reason: "prescribed in error".into(),
        canceled_by: ActorId::new(),
    }
}

#[tokio::test]
async fn create_inserts_prescription_with_items() {
    let h = harness();
    let aspirin = h.medicine("Aspirin", 10).await;
    let ibuprofen = h.medicine("Ibuprofen", 10).await;

    let created = h
        .prescriptions
        .create(new_prescription(&[(aspirin.id, qty(5)), (ibuprofen.id, qty(2))]))
        .await
        .unwrap();

    assert_eq!(created.prescription.status, PrescriptionStatus::Created);
    assert_eq!(created.items.len(), 2);
    let fetched = h.prescriptions.get(created.prescription.id).await.unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn create_requires_items_and_positive_quantities() {
    let h = harness();
    let aspirin = h.medicine("Aspirin", 10).await;

    let empty = h.prescriptions.create(new_prescription(&[])).await;
    let zero = h
        .prescriptions
        .create(new_prescription(&[(aspirin.id, qty(0))]))
        .await;
    let unknown_medicine = h
        .prescriptions
        .create(new_prescription(&[(MedicineId::new(), qty(1))]))
        .await;

    assert_eq!(empty.unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(zero.unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(unknown_medicine.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn create_checks_the_encounter() {
    let known = EncounterId::new();
    let h = harness_with(
        Arc::new(RecordingPublisher::new()),
        Arc::new(StaticEncounterDirectory::with_encounters([known])),
        RecordingPublisher::new(),
    );
    let aspirin = h.medicine("Aspirin", 10).await;

    let mut input = new_prescription(&[(aspirin.id, qty(1))]);
    let missing = h.prescriptions.create(input.clone()).await;
    input.encounter_id = known;
    let found = h.prescriptions.create(input).await;

    assert_eq!(missing.unwrap_err().kind(), ErrorKind::NotFound);
    assert!(found.is_ok());
}

#[tokio::test]
async fn unreachable_encounter_service_is_upstream_unavailable() {
    let h = harness_with(
        Arc::new(RecordingPublisher::new()),
        Arc::new(StaticEncounterDirectory::unavailable()),
        RecordingPublisher::new(),
    );
    let aspirin = h.medicine("Aspirin", 10).await;

    let result = h
        .prescriptions
        .create(new_prescription(&[(aspirin.id, qty(1))]))
        .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::UpstreamUnavailable);
}

#[tokio::test]
async fn update_marks_untouched_prescriptions_updated() {
    let h = harness();
    let aspirin = h.medicine("Aspirin", 10).await;
    let rx = h.prescribe(&[(&aspirin, 5)]).await;

    let updated = h
        .prescriptions
        .update(
            rx.prescription.id,
            PrescriptionUpdate {
                notes: Some("take with food".into()),
                ..PrescriptionUpdate::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.prescription.status, PrescriptionStatus::Updated);
    assert_eq!(updated.prescription.notes.as_deref(), Some("take with food"));
}

#[tokio::test]
async fn update_after_partial_dispense_keeps_rollup_status() {
    let h = harness();
    let aspirin = h.medicine("Aspirin", 10).await;
    let rx = h.prescribe(&[(&aspirin, 5)]).await;
    let dispense_id = h.open(&rx).await;
    h.add(dispense_id, &rx.items[0], qty(2)).await.unwrap();
    h.complete(dispense_id).await.unwrap();

    let updated = h
        .prescriptions
        .update(rx.prescription.id, PrescriptionUpdate::default())
        .await
        .unwrap();

    assert_eq!(
        updated.prescription.status,
        PrescriptionStatus::PartiallyDispensed
    );
}

#[tokio::test]
async fn canceled_prescription_is_frozen() {
    let h = harness();
    let aspirin = h.medicine("Aspirin", 10).await;
    let rx = h.prescribe(&[(&aspirin, 5)]).await;
    let id = rx.prescription.id;

    let canceled = h.prescriptions.cancel(id, cancellation()).await.unwrap();
    assert_eq!(canceled.prescription.status, PrescriptionStatus::Canceled);
    assert!(canceled.prescription.canceled_at.is_some());
    assert_eq!(
        canceled.prescription.canceled_reason.as_deref(),
        Some("prescribed in error")
    );

    let update = h.prescriptions.update(id, PrescriptionUpdate::default()).await;
    let add = h
        .prescriptions
        .add_item(id, NewPrescriptionItem::new(aspirin.id, qty(1)))
        .await;
    let remove = h.prescriptions.remove_item(id, rx.items[0].id).await;

    assert_eq!(update.unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(add.unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(remove.unwrap_err().kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn cancelling_twice_is_a_no_op() {
    let h = harness();
    let aspirin = h.medicine("Aspirin", 10).await;
    let rx = h.prescribe(&[(&aspirin, 5)]).await;

    let first = h
        .prescriptions
        .cancel(rx.prescription.id, cancellation())
        .await
        .unwrap();
    let second = h
        .prescriptions
        .cancel(
            rx.prescription.id,
            Cancellation {
                reason: "again".into(),
                canceled_by: ActorId::new(),
            },
        )
        .await
        .unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn dispensed_prescription_cannot_be_canceled() {
    let h = harness();
    let aspirin = h.medicine("Aspirin", 10).await;
    let rx = h.prescribe(&[(&aspirin, 1)]).await;
    let dispense_id = h.open(&rx).await;
    h.add(dispense_id, &rx.items[0], qty(1)).await.unwrap();
    h.complete(dispense_id).await.unwrap();

    let result = h.prescriptions.cancel(rx.prescription.id, cancellation()).await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn items_can_be_added_and_removed_before_dispensing() {
    let h = harness();
    let aspirin = h.medicine("Aspirin", 10).await;
    let ibuprofen = h.medicine("Ibuprofen", 10).await;
    let rx = h.prescribe(&[(&aspirin, 5)]).await;
    let id = rx.prescription.id;

    let added = h
        .prescriptions
        .add_item(id, NewPrescriptionItem::new(ibuprofen.id, qty(3)))
        .await
        .unwrap();
    assert_eq!(added.items.len(), 2);
    assert_eq!(added.prescription.status, PrescriptionStatus::Updated);

    let removed = h.prescriptions.remove_item(id, rx.items[0].id).await.unwrap();
    assert_eq!(removed.items.len(), 1);
    assert_eq!(removed.items[0].medicine_id, ibuprofen.id);
}

#[tokio::test]
async fn removing_the_last_open_item_completes_the_rollup() {
    let h = harness();
    let aspirin = h.medicine("Aspirin", 10).await;
    let ibuprofen = h.medicine("Ibuprofen", 10).await;
    let rx = h.prescribe(&[(&aspirin, 5), (&ibuprofen, 5)]).await;
    let dispense = h.open(&rx).await;
    h.add(dispense, &rx.items[0], qty(5)).await.unwrap();
    h.complete(dispense).await.unwrap();

    let removed = h
        .prescriptions
        .remove_item(rx.prescription.id, rx.items[1].id)
        .await
        .unwrap();

    assert_eq!(removed.prescription.status, PrescriptionStatus::Dispensed);
    let stored = h.store.prescription_snapshot(rx.prescription.id).await.unwrap();
    assert_eq!(stored.status, PrescriptionStatus::Dispensed);
    let reopened = h
        .workflow
        .create_dispense(NewDispense {
            prescription_id: rx.prescription.id,
            notes: None,
            created_by: None,
        })
        .await;
    assert_eq!(reopened.unwrap_err().kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn item_with_dispense_lines_cannot_be_removed() {
    let h = harness();
    let aspirin = h.medicine("Aspirin", 10).await;
    let ibuprofen = h.medicine("Ibuprofen", 10).await;
    let rx = h.prescribe(&[(&aspirin, 5), (&ibuprofen, 2)]).await;
    let dispense_id = h.open(&rx).await;
    h.add(dispense_id, &rx.items[0], qty(1)).await.unwrap();

    let result = h
        .prescriptions
        .remove_item(rx.prescription.id, rx.items[0].id)
        .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn removing_a_foreign_item_is_not_found() {
    let h = harness();
    let aspirin = h.medicine("Aspirin", 10).await;
    let rx = h.prescribe(&[(&aspirin, 5)]).await;
    let other = h.prescribe(&[(&aspirin, 5)]).await;

    let foreign = h
        .prescriptions
        .remove_item(rx.prescription.id, other.items[0].id)
        .await;
    let unknown = h
        .prescriptions
        .remove_item(rx.prescription.id, PrescriptionItemId::new())
        .await;

    assert_eq!(foreign.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(unknown.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn medicines_are_registered_and_restocked() {
    let h = harness();

    let medicine = h
        .medicines
        .register(NewMedicine::new("Metformin", qty(4)))
        .await
        .unwrap();
    let restocked = h.medicines.receive_stock(medicine.id, qty(6)).await.unwrap();

    assert_eq!(restocked.stock, qty(10));
    assert_eq!(h.medicines.get(medicine.id).await.unwrap().stock, qty(10));
}

#[tokio::test]
async fn medicine_input_is_validated() {
    let h = harness();
    let aspirin = h.medicine("Aspirin", 1).await;

    let negative = h
        .medicines
        .register(NewMedicine::new("Metformin", qty(-1)))
        .await;
    let blank = h.medicines.register(NewMedicine::new("  ", qty(1))).await;
    let zero_receipt = h.medicines.receive_stock(aspirin.id, qty(0)).await;
    let unknown = h.medicines.receive_stock(MedicineId::new(), qty(1)).await;

    assert_eq!(negative.unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(blank.unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(zero_receipt.unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(unknown.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn quantities_must_fit_the_stored_precision() {
    let h = harness();
    let aspirin = h.medicine("Aspirin", 10).await;

    let receipt_overflow = h.medicines.receive_stock(aspirin.id, Decimal::MAX).await;
    let receipt_scale = h
        .medicines
        .receive_stock(aspirin.id, Decimal::new(10_004, 4))
        .await;
    let opening_scale = h
        .medicines
        .register(NewMedicine::new("Metformin", Decimal::new(1, 4)))
        .await;
    let prescribed_scale = h
        .prescriptions
        .create(new_prescription(&[(aspirin.id, Decimal::new(4, 4))]))
        .await;

    assert_eq!(receipt_overflow.unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(receipt_scale.unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(opening_scale.unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(prescribed_scale.unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(h.medicines.get(aspirin.id).await.unwrap().stock, qty(10));
}

#[tokio::test]
async fn receipt_cannot_push_stock_past_the_bound() {
    let h = harness();
    let near_full = h
        .medicines
        .register(NewMedicine::new("Bulk", Decimal::new(99_999_999_999, 0)))
        .await
        .unwrap();

    let result = h.medicines.receive_stock(near_full.id, qty(1)).await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(
        h.medicines.get(near_full.id).await.unwrap().stock,
        Decimal::new(99_999_999_999, 0)
    );
}
