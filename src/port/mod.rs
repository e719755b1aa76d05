//! Typed client for the Port API.

mod client;
mod types;

pub use client::PortClient;
pub use types::KafkaCredentials;
