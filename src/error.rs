//! Error taxonomy for the agent.
//!
//! Config and mapping errors are fatal at startup; everything else is
//! recoverable at some level of the pipeline (see the per-component docs).

use thiserror::Error;

/// Unified error type for the agent library.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or unparseable environment configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The control-the-payload mapping file could not be read or parsed.
    /// Fatal at startup.
    #[error("mapping config error: {0}")]
    Mapping(String),

    /// Minting a Port API access token failed. Retriable.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A Port API call returned a non-success status or malformed body.
    /// Retriable; the source adapter backs off.
    #[error("control plane request failed: {0}")]
    ControlPlane(String),

    /// The outbound target rejected the dispatch.
    #[error("invoker failed with status code: {0}")]
    DispatchStatus(u16),

    /// The outbound dispatch could not be performed at all.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("decryption error: {0}")]
    Crypto(String),

    /// An event document is missing a field the pipeline cannot do without.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The polling adapter failed continuously for longer than
    /// `POLLING_MAX_FAILURE_DURATION_SECONDS`.
    #[error("polling has been failing for {0} seconds, giving up")]
    FailureWindowExceeded(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
