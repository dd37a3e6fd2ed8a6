//! Shared setup for workflow tests.

#![allow(dead_code, clippy::expect_used)]

use dispensary_core::encounter::EncounterDirectory;
use dispensary_core::event::EventPublisher;
use dispensary_core::{
    ActorId, DispenseId, Medicine, PrescriptionItem, PrescriptionWithItems,
};
use dispensary_runtime::{
    Completion, DispensaryEnvironment, DispenseWorkflow, MedicineService, NewDispense,
    NewDispenseLine, PrescriptionService,
};
use dispensary_testing::{
    InMemoryStore, RecordingPublisher, StaticEncounterDirectory, fixtures, test_clock,
};
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct Harness {
    pub store: InMemoryStore,
    pub publisher: RecordingPublisher,
    pub workflow: DispenseWorkflow,
    pub prescriptions: PrescriptionService,
    pub medicines: MedicineService,
}

pub fn harness() -> Harness {
    let publisher = RecordingPublisher::new();
    harness_with(
        Arc::new(publisher.clone()),
        Arc::new(StaticEncounterDirectory::allow_all()),
        publisher,
    )
}

pub fn harness_with(
    publisher: Arc<dyn EventPublisher>,
    encounters: Arc<dyn EncounterDirectory>,
    recorder: RecordingPublisher,
) -> Harness {
    let store = InMemoryStore::new();
    let env = DispensaryEnvironment::new(
        Arc::new(store.clone()),
        publisher,
        encounters,
        Arc::new(test_clock()),
    );
    Harness {
        store,
        publisher: recorder,
        workflow: DispenseWorkflow::new(env.clone()),
        prescriptions: PrescriptionService::new(env.clone()),
        medicines: MedicineService::new(env),
    }
}

impl Harness {
    pub async fn medicine(&self, name: &str, stock: i64) -> Medicine {
        self.store.seed_medicine(name, Decimal::from(stock)).await
    }

    pub async fn prescribe(&self, items: &[(&Medicine, i64)]) -> PrescriptionWithItems {
        let pairs: Vec<_> = items
            .iter()
            .map(|(medicine, quantity)| (medicine.id, Decimal::from(*quantity)))
            .collect();
        self.prescriptions
            .create(fixtures::new_prescription(&pairs))
            .await
            .expect("prescription should be created")
    }

    pub async fn open(&self, prescription: &PrescriptionWithItems) -> DispenseId {
        self.workflow
            .create_dispense(NewDispense {
                prescription_id: prescription.prescription.id,
                notes: None,
                created_by: None,
            })
            .await
            .expect("dispense should be created")
            .dispense
            .id
    }

    pub async fn add(
        &self,
        dispense_id: DispenseId,
        item: &PrescriptionItem,
        quantity: Decimal,
    ) -> dispensary_core::Result<dispensary_core::DispenseWithLines> {
        self.workflow
            .add_line(
                dispense_id,
                NewDispenseLine {
                    prescription_item_id: item.id,
                    quantity_dispensed: quantity,
                    notes: None,
                },
            )
            .await
    }

    pub async fn complete(
        &self,
        dispense_id: DispenseId,
    ) -> dispensary_core::Result<dispensary_core::DispenseWithLines> {
        self.workflow
            .complete(
                dispense_id,
                Completion {
                    dispensed_by: ActorId::new(),
                },
            )
            .await
    }
}
