//! Per-run log forwarding.

use std::sync::Arc;

use tracing::info;

use crate::port::PortClient;

/// Forwards pipeline progress lines to the run's log in the control plane.
/// Changelog events have no run id; their logger only emits local traces.
/// Forwarding is best-effort by construction (see `PortClient::append_run_log`).
#[derive(Clone)]
pub struct RunLogger {
    run_id: Option<String>,
    client: Arc<PortClient>,
}

impl RunLogger {
    pub fn new(run_id: Option<String>, client: Arc<PortClient>) -> Self {
        Self { run_id, client }
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub async fn log(&self, message: &str) {
        match &self.run_id {
            Some(run_id) => {
                info!(run_id = %run_id, "{message}");
                self.client.append_run_log(run_id, message).await;
            }
            None => info!("{message}"),
        }
    }
}
