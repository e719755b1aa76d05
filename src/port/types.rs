//! Wire types for the Port API.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AckResponse {
    #[serde(rename = "ackedCount", default)]
    pub acked_count: u64,
}

/// SASL credentials for the managed Kafka, fetched at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaCredentials {
    pub brokers: Vec<String>,
    pub username: String,
    pub password: String,
}
