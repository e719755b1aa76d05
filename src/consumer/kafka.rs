//! Kafka source adapter.
//!
//! Subscribes to the org's runs and changelog topics with auto-commit
//! disabled. Offsets are committed synchronously after every handled
//! message, success or not: processing errors never block the stream
//! (at-least-once delivery, at-most-once processing for repeated
//! transient failures).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::ClientContext;
use tracing::{error, info};

use crate::config::Settings;
use crate::error::Result;
use crate::pipeline::EventProcessor;
use crate::port::PortClient;
use crate::schemas::events::EventOrigin;

const KAFKA_CONSUMER_CLIENT_ID: &str = "port-agent";
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Rebalance hook: an empty assignment means another consumer with the same
/// group id already holds the partitions, so this instance shuts down.
struct AgentContext {
    running: Arc<AtomicBool>,
}

impl ClientContext for AgentContext {}

impl ConsumerContext for AgentContext {
    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        if let Rebalance::Assign(partitions) = rebalance {
            info!(count = partitions.count(), "partition assignment");
            if partitions.count() == 0 {
                error!(
                    "No partitions assigned. This usually means that there is already a \
                     consumer with the same group id running. To run another consumer \
                     please change the group id in the `KAFKA_CONSUMER_GROUP_ID` \
                     environment variable to a unique value prefixed with your \
                     organization id."
                );
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }
}

pub struct KafkaConsumer {
    consumer: StreamConsumer<AgentContext>,
    settings: Arc<Settings>,
    processor: Arc<dyn EventProcessor>,
    running: Arc<AtomicBool>,
}

impl KafkaConsumer {
    /// Build the consumer. Outside local mode, SASL credentials and brokers
    /// come from the control plane.
    pub async fn new(
        settings: Arc<Settings>,
        port: Arc<PortClient>,
        processor: Arc<dyn EventProcessor>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let mut config = ClientConfig::new();
        config
            .set("client.id", KAFKA_CONSUMER_CLIENT_ID)
            .set("group.id", &settings.kafka.group_id)
            .set("security.protocol", &settings.kafka.security_protocol)
            .set("sasl.mechanism", &settings.kafka.authentication_mechanism)
            .set(
                "session.timeout.ms",
                settings.kafka.session_timeout_ms.to_string(),
            )
            .set("auto.offset.reset", &settings.kafka.auto_offset_reset)
            .set("enable.auto.commit", "false");

        if settings.using_local_port_instance {
            info!("using local Port instance for Kafka credentials");
            config.set("bootstrap.servers", &settings.kafka.bootstrap_servers);
        } else {
            info!("getting Kafka credentials");
            let credentials = port.get_kafka_credentials().await?;
            config
                .set("sasl.username", &credentials.username)
                .set("sasl.password", &credentials.password)
                .set("bootstrap.servers", credentials.brokers.join(","));
        }

        let consumer = config.create_with_context(AgentContext {
            running: running.clone(),
        })?;

        Ok(Self {
            consumer,
            settings,
            processor,
            running,
        })
    }

    /// Consume until the shutdown flag flips. The consumer is closed on
    /// drop when this returns.
    pub async fn run(&self) -> Result<()> {
        self.consumer.subscribe(&[
            self.settings.kafka.runs_topic.as_str(),
            self.settings.kafka.change_log_topic.as_str(),
        ])?;

        while self.running.load(Ordering::SeqCst) {
            let message = match tokio::time::timeout(POLL_TIMEOUT, self.consumer.recv()).await {
                Err(_) => continue,
                Ok(Err(e)) => {
                    error!(error = %e, "kafka consumer error");
                    continue;
                }
                Ok(Ok(message)) => message,
            };

            let topic = message.topic().to_string();
            let partition = message.partition();
            let offset = message.offset();
            info!(topic = %topic, partition, offset, "received message");

            self.handle_message(&topic, partition, offset, message.payload())
                .await;

            // Commit whatever the outcome; processing errors must not block
            // the stream.
            if let Err(e) = self.consumer.commit_message(&message, CommitMode::Sync) {
                error!(topic = %topic, partition, offset, error = %e, "failed to commit offset");
            }
        }

        info!("kafka consumer stopped");
        Ok(())
    }

    async fn handle_message(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
        payload: Option<&[u8]>,
    ) {
        let Some(payload) = payload else {
            return;
        };

        let origin = if topic == self.settings.kafka.runs_topic {
            EventOrigin::ActionRun
        } else if topic == self.settings.kafka.change_log_topic {
            EventOrigin::Changelog
        } else {
            info!(topic, "skipping message from unknown topic");
            return;
        };

        let event: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                error!(topic, partition, offset, error = %e, "failed to decode message");
                return;
            }
        };

        match self.processor.process(event, origin).await {
            Ok(()) => info!(
                topic,
                partition, offset, "successfully processed message"
            ),
            Err(e) => error!(
                topic,
                partition,
                offset,
                error = %e,
                "failed to process message"
            ),
        }
    }
}
