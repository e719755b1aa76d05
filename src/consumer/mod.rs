//! Source adapters.
//!
//! Two transports deliver run events: a Kafka subscription with manual
//! commits, and HTTP long-polling with claim/ack semantics. Both drive the
//! pipeline one event at a time and observe a cooperative shutdown flag
//! between iterations.

pub mod kafka;
pub mod polling;

pub use kafka::KafkaConsumer;
pub use polling::PollingConsumer;
