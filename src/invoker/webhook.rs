//! Signed webhook dispatcher.
//!
//! Sends the transformed request with `X-Port-Timestamp` and
//! `X-Port-Signature` attached, and captures the response for reporting.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::Settings;
use crate::crypto::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::error::{Error, Result};
use crate::schemas::events::ResponseView;
use crate::transform::RequestPlan;

use super::RunLogger;

pub struct WebhookInvoker {
    http: reqwest::Client,
    timeout: Duration,
    secret: String,
    detailed_logging: bool,
}

impl WebhookInvoker {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            timeout: settings.webhook_invoker_timeout,
            secret: settings.port_client_secret.clone(),
            detailed_logging: settings.detailed_logging,
        })
    }

    /// Send the planned request and capture the outcome. Transport-level
    /// failures (unreachable host, timeout) are dispatch errors; HTTP error
    /// statuses are captured and left for the pipeline to judge.
    pub async fn dispatch(&self, plan: &RequestPlan, run_logger: &RunLogger) -> Result<ResponseView> {
        let method = reqwest::Method::from_bytes(plan.method.to_uppercase().as_bytes())
            .map_err(|_| Error::Dispatch(format!("invalid HTTP method: {}", plan.method)))?;

        let (timestamp, signature) = crypto::signature_headers(&plan.body, &self.secret);
        if self.detailed_logging {
            debug!(body = %crypto::compact_json(&plan.body), "outgoing request body");
        }

        let mut request = self
            .http
            .request(method, &plan.url)
            .timeout(self.timeout)
            .query(&plan.query)
            .json(&plan.body);
        for (name, value) in &plan.headers {
            request = request.header(name, value);
        }
        request = request
            .header(TIMESTAMP_HEADER, &timestamp)
            .header(SIGNATURE_HEADER, &signature);

        run_logger
            .log(&format!(
                "Sending a {} request to {}",
                plan.method, plan.url
            ))
            .await;

        let response = request
            .send()
            .await
            .map_err(|e| Error::Dispatch(format!("request to {} failed: {e}", plan.url)))?;

        let status_code = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let text = response.text().await.unwrap_or_default();
        let json = serde_json::from_str(&text).ok();

        info!(url = %plan.url, status_code, "webhook dispatch finished");
        Ok(ResponseView {
            status_code,
            headers,
            text,
            json,
        })
    }
}
