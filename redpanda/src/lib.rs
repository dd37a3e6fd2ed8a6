//! Redpanda publisher for prescription-ready notifications.
//!
//! Implements [`EventPublisher`] from `dispensary-core` on top of rdkafka, so it
//! works against Redpanda or any other Kafka-compatible broker.
//!
//! # Delivery
//!
//! Each call to [`EventPublisher::publish`]:
//!
//! 1. ensures the topic exists through the admin client (an "already exists"
//!    answer counts as success),
//! 2. creates a fresh producer with `acks=all`,
//! 3. sends one JSON record keyed by the prescription id,
//! 4. flushes and drops the producer.
//!
//! There is no retry. The caller logs a failure and moves on; the dispense it
//! reports on has already been committed.
//!
//! # Example
//!
//! ```no_run
//! use dispensary_core::event::{EventPublisher, PrescriptionReady};
//! use dispensary_core::{DispenseId, PrescriptionId};
//! use dispensary_redpanda::RedpandaPublisher;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let publisher = RedpandaPublisher::builder()
//!     .brokers("localhost:9092")
//!     .topic("prescription_notifications")
//!     .build()?;
//!
//! let event = PrescriptionReady::new(PrescriptionId::new(), DispenseId::new());
//! publisher.publish(&event).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use dispensary_core::event::{EventPublisher, PrescriptionReady, PublishError};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Topic used when none is configured.
pub const DEFAULT_TOPIC: &str = "prescription_notifications";

/// Publishes [`PrescriptionReady`] events to a Redpanda topic.
///
/// Holds configuration only. No broker connection outlives a single publish.
///
/// # Example
///
/// ```no_run
/// use dispensary_redpanda::RedpandaPublisher;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let publisher = RedpandaPublisher::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .partitions(3)
///     .replication_factor(3)
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RedpandaPublisher {
    brokers: String,
    topic: String,
    partitions: i32,
    replication_factor: i32,
    timeout: Duration,
}

impl RedpandaPublisher {
    /// Create a publisher for `brokers` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::ConnectionFailed`] if `brokers` is blank.
    pub fn new(brokers: &str) -> Result<Self, PublishError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder.
    #[must_use]
    pub fn builder() -> RedpandaPublisherBuilder {
        RedpandaPublisherBuilder::default()
    }

    /// Broker addresses.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Destination topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Send and admin operation timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn admin_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.brokers);
        config
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("acks", "all")
            .set("message.timeout.ms", self.timeout.as_millis().to_string());
        config
    }

    async fn ensure_topic(&self) -> Result<(), PublishError> {
        let topic_setup = |reason: String| PublishError::TopicSetup {
            topic: self.topic.clone(),
            reason,
        };

        let admin: AdminClient<DefaultClientContext> = self
            .admin_config()
            .create()
            .map_err(|e| PublishError::ConnectionFailed(format!("admin client: {e}")))?;

        let new_topic = NewTopic::new(
            &self.topic,
            self.partitions,
            TopicReplication::Fixed(self.replication_factor),
        );
        let options = AdminOptions::new()
            .request_timeout(Some(self.timeout))
            .operation_timeout(Some(self.timeout));

        let results = admin
            .create_topics([&new_topic], &options)
            .await
            .map_err(|e| topic_setup(e.to_string()))?;

        for result in results {
            match result {
                Ok(topic) => tracing::info!(topic = %topic, "Topic created"),
                Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {},
                Err((_, code)) => return Err(topic_setup(code.to_string())),
            }
        }
        Ok(())
    }

    async fn send(&self, event: &PrescriptionReady) -> Result<(), PublishError> {
        let payload = event.to_json()?;
        let key = event.prescription_id.to_string();

        let producer: FutureProducer = self
            .producer_config()
            .create()
            .map_err(|e| PublishError::ConnectionFailed(format!("producer: {e}")))?;

        let record = FutureRecord::to(&self.topic).payload(&payload).key(&key);

        match producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic = %self.topic,
                    partition = partition,
                    offset = offset,
                    prescription_id = %event.prescription_id,
                    dispense_id = %event.dispense_id,
                    "Event published"
                );
            },
            Err((kafka_error, _)) => {
                return Err(PublishError::PublishFailed {
                    topic: self.topic.clone(),
                    reason: kafka_error.to_string(),
                });
            },
        }

        producer
            .flush(Timeout::After(self.timeout))
            .map_err(|e| PublishError::PublishFailed {
                topic: self.topic.clone(),
                reason: format!("flush: {e}"),
            })
    }
}

impl EventPublisher for RedpandaPublisher {
    fn publish(
        &self,
        event: &PrescriptionReady,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + '_>> {
        let event = event.clone();

        Box::pin(async move {
            self.ensure_topic().await?;
            self.send(&event).await
        })
    }
}

/// Builder for configuring a [`RedpandaPublisher`].
#[derive(Default)]
pub struct RedpandaPublisherBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    partitions: Option<i32>,
    replication_factor: Option<i32>,
    timeout: Option<Duration>,
}

impl RedpandaPublisherBuilder {
    /// Set the broker addresses.
    ///
    /// # Parameters
    ///
    /// - `brokers`: Comma-separated list of broker addresses (e.g., "localhost:9092")
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the destination topic.
    ///
    /// Default: [`DEFAULT_TOPIC`]
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Partition count used when the topic has to be created.
    ///
    /// Default: 1
    #[must_use]
    pub const fn partitions(mut self, partitions: i32) -> Self {
        self.partitions = Some(partitions);
        self
    }

    /// Replication factor used when the topic has to be created.
    ///
    /// Default: 1
    #[must_use]
    pub const fn replication_factor(mut self, replication_factor: i32) -> Self {
        self.replication_factor = Some(replication_factor);
        self
    }

    /// Set the send and admin operation timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the [`RedpandaPublisher`].
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::ConnectionFailed`] if brokers are not set, and
    /// [`PublishError::TopicSetup`] if the topic name is blank or the
    /// partition or replication count is not positive.
    pub fn build(self) -> Result<RedpandaPublisher, PublishError> {
        let brokers = self
            .brokers
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| PublishError::ConnectionFailed("Brokers not configured".to_string()))?;
        let topic = self.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        let partitions = self.partitions.unwrap_or(1);
        let replication_factor = self.replication_factor.unwrap_or(1);

        if topic.trim().is_empty() {
            return Err(PublishError::TopicSetup {
                topic,
                reason: "topic name is blank".to_string(),
            });
        }
        if partitions < 1 || replication_factor < 1 {
            return Err(PublishError::TopicSetup {
                topic,
                reason: format!(
                    "partitions ({partitions}) and replication factor ({replication_factor}) must be positive"
                ),
            });
        }

        tracing::info!(
            brokers = %brokers,
            topic = %topic,
            partitions = partitions,
            replication_factor = replication_factor,
            "RedpandaPublisher configured"
        );

        Ok(RedpandaPublisher {
            brokers,
            topic,
            partitions,
            replication_factor,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
        })
    }
}
