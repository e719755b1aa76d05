//! Control-plane client.
//!
//! Every operation mints a fresh access token (the token endpoint is cheap
//! and the agent is single-flight); a failed mint surfaces as a retriable
//! authentication error. All calls attach `User-Agent: port-agent`.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::error::{Error, Result};

use super::types::{AccessTokenResponse, AckResponse};
use super::KafkaCredentials;

const AGENT_USER_AGENT: &str = "port-agent";

pub struct PortClient {
    http: reqwest::Client,
    settings: Arc<Settings>,
}

impl PortClient {
    pub fn new(settings: Arc<Settings>) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, settings })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}{path}",
            self.settings.port_api_base_url.trim_end_matches('/')
        )
    }

    /// Mint an access token and build the standard call headers.
    async fn api_headers(&self) -> Result<HeaderMap> {
        let credentials = json!({
            "clientId": self.settings.port_client_id,
            "clientSecret": self.settings.port_client_secret,
        });
        let response = self
            .http
            .post(self.url("/v1/auth/access_token"))
            .json(&credentials)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body, "failed to get Port API access token");
            return Err(Error::Auth(format!(
                "token endpoint returned status {status}"
            )));
        }

        let token: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("malformed token response: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.access_token))
                .map_err(|e| Error::Auth(format!("invalid token value: {e}")))?,
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(AGENT_USER_AGENT));
        Ok(headers)
    }

    /// Reserve up to `limit` pending runs for this installation.
    pub async fn claim_pending_runs(&self, limit: usize) -> Result<Vec<Value>> {
        let headers = self.api_headers().await?;
        let body = json!({
            "installationId": self.settings.port_installation_id,
            "limit": limit,
            "invocationMethod": "WEBHOOK",
        });
        let response = self
            .http
            .post(self.url("/v1/actions/runs/claim-pending"))
            .headers(headers)
            .header("x-port-reserved-usage", "true")
            .json(&body)
            .send()
            .await?;
        let value = Self::success_json(response, "claim-pending").await?;
        // The endpoint wraps the documents in `runs`; accept a bare list too.
        let runs = match value {
            Value::Array(runs) => runs,
            Value::Object(mut obj) => match obj.shift_remove("runs") {
                Some(Value::Array(runs)) => runs,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        debug!(count = runs.len(), "claimed pending runs");
        Ok(runs)
    }

    /// Commit that this agent will process the given runs. An `ackedCount`
    /// of 0 means another consumer won the race for every id.
    pub async fn ack_runs(&self, run_ids: &[String]) -> Result<u64> {
        let headers = self.api_headers().await?;
        let response = self
            .http
            .patch(self.url("/v1/actions/runs/ack"))
            .headers(headers)
            .json(&json!({ "runIds": run_ids }))
            .send()
            .await?;
        let value = Self::success_json(response, "ack").await?;
        let acked: AckResponse = serde_json::from_value(value)
            .map_err(|e| Error::ControlPlane(format!("malformed ack response: {e}")))?;
        Ok(acked.acked_count)
    }

    /// Patch an action run with a compact report (null fields omitted by the
    /// caller's serialization).
    pub async fn report_run_status(&self, run_id: &str, patch: &Value) -> Result<()> {
        let headers = self.api_headers().await?;
        let response = self
            .http
            .patch(self.url(&format!("/v1/actions/runs/{run_id}")))
            .headers(headers)
            .json(patch)
            .send()
            .await?;
        let status = response.status();
        info!(run_id, %status, "reported run status");
        Self::ensure_success(response, "report run status").await
    }

    /// Feed the captured target response back on synchronized invocations.
    pub async fn report_run_response(&self, run_id: &str, body: &Value) -> Result<()> {
        let headers = self.api_headers().await?;
        let response = self
            .http
            .patch(self.url(&format!("/v1/actions/runs/{run_id}/response")))
            .headers(headers)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        info!(run_id, %status, "reported run response");
        Self::ensure_success(response, "report run response").await
    }

    /// Append a line to the run's log. Best-effort: failures are logged and
    /// swallowed, a lost log line never fails a run.
    pub async fn append_run_log(&self, run_id: &str, message: &str) {
        let result: Result<()> = async {
            let headers = self.api_headers().await?;
            let response = self
                .http
                .post(self.url(&format!("/v1/actions/runs/{run_id}/logs")))
                .headers(headers)
                .json(&json!({ "message": message }))
                .send()
                .await?;
            Self::ensure_success(response, "append run log").await
        }
        .await;
        if let Err(e) = result {
            error!(run_id, error = %e, "failed to append run log");
        }
    }

    pub async fn get_kafka_credentials(&self) -> Result<KafkaCredentials> {
        let headers = self.api_headers().await?;
        let response = self
            .http
            .get(self.url("/v1/kafka-credentials"))
            .headers(headers)
            .send()
            .await?;
        let value = Self::success_json(response, "kafka-credentials").await?;
        // Newer API versions nest the credentials object.
        let raw = match &value {
            Value::Object(obj) if obj.contains_key("credentials") => value["credentials"].clone(),
            _ => value,
        };
        serde_json::from_value(raw)
            .map_err(|e| Error::ControlPlane(format!("malformed kafka credentials: {e}")))
    }

    /// Record which streamer this installation runs. Best-effort at startup.
    pub async fn patch_org_streamer_setting(&self, name: &str) {
        let result: Result<()> = async {
            let headers = self.api_headers().await?;
            let body = json!({ "settings": { "portAgentStreamerName": name } });
            let response = self
                .http
                .patch(self.url("/v1/organization"))
                .headers(headers)
                .json(&body)
                .send()
                .await?;
            Self::ensure_success(response, "patch org streamer setting").await
        }
        .await;
        match result {
            Ok(()) => info!(streamer = name, "updated org streamer setting"),
            Err(e) => error!(error = %e, "failed to update org streamer setting"),
        }
    }

    async fn ensure_success(response: reqwest::Response, op: &str) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::ControlPlane(format!(
            "{op} returned status {status}: {body}"
        )))
    }

    async fn success_json(response: reqwest::Response, op: &str) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ControlPlane(format!(
                "{op} returned status {status}: {body}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::ControlPlane(format!("{op} returned malformed JSON: {e}")))
    }
}
