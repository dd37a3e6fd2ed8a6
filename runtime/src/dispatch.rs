//! Best-effort delivery of `prescription_ready` events.

use dispensary_core::event::{EventPublisher, PrescriptionReady};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Publish `event` on a background task.
///
/// Called only after the completing unit of work has committed. The publisher
/// is invoked exactly once; a failure is logged and counted, never retried
/// and never reported to the caller.
pub fn spawn_publish(
    publisher: Arc<dyn EventPublisher>,
    event: PrescriptionReady,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match publisher.publish(&event).await {
            Ok(()) => {
                tracing::debug!(
                    prescription_id = %event.prescription_id,
                    dispense_id = %event.dispense_id,
                    "Published prescription_ready"
                );
            }
            Err(error) => {
                metrics::counter!("dispensary.publish.failed").increment(1);
                tracing::warn!(
                    prescription_id = %event.prescription_id,
                    dispense_id = %event.dispense_id,
                    error = %error,
                    "Failed to publish prescription_ready, dropping event"
                );
            }
        }
    })
}
