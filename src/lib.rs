//! Port Agent
//!
//! A self-hosted execution agent for Port action runs: it pulls run events
//! from the control plane (Kafka subscription or HTTP long-polling),
//! transforms each payload through the user's declarative mapping config,
//! dispatches the result to a webhook or GitLab pipeline inside the user's
//! network, and reports status and response back to Port.
//!
//! # Overview
//!
//! The crate is the ingest–transform–dispatch–report pipeline:
//! - **Source adapters** ([`consumer`]): Kafka with manual commits, or
//!   claim/ack long-polling with exponential backoff.
//! - **Payload transformer** ([`transform`]): picks the first enabled
//!   mapping, evaluates jq-style expressions ([`expr`]) and decrypts
//!   designated fields ([`crypto`]).
//! - **Dispatchers** ([`invoker`]): signed webhook requests and GitLab
//!   pipeline triggers.
//! - **Run pipeline** ([`pipeline`]): per-event orchestration and status
//!   reporting through the control-plane client ([`port`]).
//!
//! Delivery is at-least-once; the control plane owns the queue and all
//! durable state.

pub mod agent;
pub mod config;
pub mod consumer;
pub mod crypto;
pub mod error;
pub mod expr;
pub mod invoker;
pub mod pipeline;
pub mod port;
pub mod transform;

pub mod schemas {
    //! Schema definitions for run events and payload mappings.

    pub mod events;
    pub mod mapping;
}

// Re-export commonly used types at the crate root
pub use config::{Settings, StreamerName};
pub use error::{Error, Result};
pub use pipeline::{EventProcessor, RunPipeline};
pub use port::PortClient;
pub use schemas::events::{EventOrigin, InvocationMethod, InvocationType, ResponseView};
pub use schemas::mapping::{load_mappings, Mapping, ReportMapping};
pub use transform::{ReportPlan, RequestPlan, Transformer};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
