//! Mock event publishers.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use dispensary_core::event::{EventPublisher, PrescriptionReady, PublishError};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Captures every published event.
///
/// Publishing happens on a spawned task after commit, so tests use
/// [`RecordingPublisher::wait_for`] instead of asserting immediately.
#[derive(Clone, Debug, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<PrescriptionReady>>>,
    notify: Arc<Notify>,
}

impl RecordingPublisher {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events published so far, in order
    #[must_use]
    pub fn events(&self) -> Vec<PrescriptionReady> {
        self.events.lock().unwrap().clone()
    }

    /// Wait until at least `count` events were published or `timeout` elapses.
    /// Returns whether the count was reached.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.events.lock().unwrap().len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(
        &self,
        event: &PrescriptionReady,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
        let event = event.clone();
        Box::pin(async move {
            self.events.lock().unwrap().push(event);
            self.notify.notify_waiters();
            Ok(())
        })
    }
}

/// Fails every publish and counts the attempts.
#[derive(Clone, Debug, Default)]
pub struct FailingPublisher {
    attempts: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl FailingPublisher {
    /// Create a publisher that always fails
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of publish calls so far
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` attempts were made or `timeout` elapses.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.attempts() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

impl EventPublisher for FailingPublisher {
    fn publish(
        &self,
        _event: &PrescriptionReady,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_waiters();
            Err(PublishError::ConnectionFailed("broker unreachable".to_string()))
        })
    }
}
