//! Integration tests for [`RedpandaPublisher`] against a real Kafka-compatible broker.
//!
//! Marked `#[ignore]`: they need Docker and take a while to start the broker.
//!
//! ```bash
//! cargo test -p dispensary-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use dispensary_core::event::{EventPublisher, PrescriptionReady};
use dispensary_core::{DispenseId, PrescriptionId};
use dispensary_redpanda::RedpandaPublisher;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

async fn start_broker() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "false")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

fn publisher(brokers: &str, topic: &str) -> RedpandaPublisher {
    RedpandaPublisher::builder()
        .brokers(brokers)
        .topic(topic)
        .timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to build publisher")
}

/// Publish, retrying while the broker finishes starting.
async fn publish_when_ready(publisher: &RedpandaPublisher, event: &PrescriptionReady) {
    let max_attempts = 60;
    for attempt in 1..=max_attempts {
        if publisher.publish(event).await.is_ok() {
            return;
        }
        assert!(
            attempt != max_attempts,
            "Broker failed to accept a publish after {max_attempts} attempts"
        );
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

fn consumer(brokers: &str, topic: &str) -> StreamConsumer {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", format!("test-{topic}"))
        .set("auto.offset.reset", "earliest")
        .set("enable.partition.eof", "false")
        .create()
        .expect("Failed to create consumer");
    consumer.subscribe(&[topic]).expect("Failed to subscribe");
    consumer
}

#[tokio::test]
#[ignore]
async fn publish_creates_topic_and_delivers_json_keyed_by_prescription() {
    let (_kafka, brokers) = start_broker().await;
    let topic = "prescription_notifications";
    let publisher = publisher(&brokers, topic);
    let event = PrescriptionReady::new(PrescriptionId::new(), DispenseId::new());

    publish_when_ready(&publisher, &event).await;

    let consumer = consumer(&brokers, topic);
    let message = tokio::time::timeout(Duration::from_secs(30), consumer.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Failed to receive event");

    let key = std::str::from_utf8(message.key().expect("key")).expect("utf8 key");
    assert_eq!(key, event.prescription_id.to_string());

    let payload: serde_json::Value =
        serde_json::from_slice(message.payload().expect("payload")).expect("json payload");
    assert_eq!(
        payload,
        serde_json::json!({
            "event_type": "prescription_ready",
            "prescription_id": event.prescription_id.to_string(),
            "dispense_id": event.dispense_id.to_string(),
            "status": "READY",
        })
    );
}

#[tokio::test]
#[ignore]
async fn existing_topic_is_not_an_error() {
    let (_kafka, brokers) = start_broker().await;
    let publisher = publisher(&brokers, "ready-twice");

    let first = PrescriptionReady::new(PrescriptionId::new(), DispenseId::new());
    publish_when_ready(&publisher, &first).await;

    let second = PrescriptionReady::new(PrescriptionId::new(), DispenseId::new());
    publisher
        .publish(&second)
        .await
        .expect("second publish should reuse the topic");
}

#[tokio::test]
async fn unreachable_broker_fails_without_panicking() {
    let publisher = RedpandaPublisher::builder()
        .brokers("127.0.0.1:1")
        .timeout(Duration::from_millis(500))
        .build()
        .expect("Failed to build publisher");
    let event = PrescriptionReady::new(PrescriptionId::new(), DispenseId::new());

    let result = publisher.publish(&event).await;

    assert!(result.is_err());
}
