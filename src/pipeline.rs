//! Run Pipeline
//!
//! Per-event orchestration: validate → transform → dispatch → report
//! response → report status. One event at a time, in arrival order; the
//! source adapters own retry and backoff, the pipeline owns everything
//! between receiving an event and the final status patch.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Settings;
use crate::crypto;
use crate::error::{Error, Result};
use crate::invoker::{GitLabInvoker, RunLogger, WebhookInvoker};
use crate::port::PortClient;
use crate::schemas::events::{self, EventOrigin, InvocationMethod, InvocationType};
use crate::schemas::mapping::Mapping;
use crate::transform::Transformer;

/// Contract between the source adapters and the pipeline: hand over one
/// event, learn whether processing succeeded.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn process(&self, event: Value, origin: EventOrigin) -> Result<()>;
}

pub struct RunPipeline {
    settings: Arc<Settings>,
    port: Arc<PortClient>,
    transformer: Transformer,
    webhook: WebhookInvoker,
    gitlab: GitLabInvoker,
}

impl RunPipeline {
    pub fn new(
        settings: Arc<Settings>,
        port: Arc<PortClient>,
        mappings: Arc<Vec<Mapping>>,
    ) -> Result<Self> {
        let transformer = Transformer::new(mappings, settings.port_client_secret.clone());
        let webhook = WebhookInvoker::new(&settings)?;
        let gitlab = GitLabInvoker::new(&settings)?;
        Ok(Self {
            settings,
            port,
            transformer,
            webhook,
            gitlab,
        })
    }

    async fn process_webhook(
        &self,
        mut event: Value,
        descriptor: InvocationMethod,
        origin: EventOrigin,
        run_logger: RunLogger,
    ) -> Result<()> {
        // Changelog events are not signed; run events are verified and have
        // the signing entries stripped before the event goes anywhere else.
        if origin == EventOrigin::ActionRun
            && !crypto::verify_incoming_signature(
                &mut event,
                &self.settings.port_client_secret,
                false,
            )
        {
            return Ok(());
        }

        let mapping = self.transformer.select_mapping(&event);
        if let Some(mapping) = mapping {
            self.transformer.decrypt_fields(&mut event, mapping);
        }

        let plan = self.transformer.request_plan(&event, &descriptor, mapping);
        if mapping.is_none() && plan.url.is_empty() {
            info!("skipping event: no matching mapping and no destination url");
            return Ok(());
        }

        run_logger
            .log(&format!("Preparing a {} request to {}", plan.method, plan.url))
            .await;
        let response = self.webhook.dispatch(&plan, &run_logger).await?;
        run_logger
            .log(&format!(
                "Invoker responded with status code: {}",
                response.status_code
            ))
            .await;

        if let Some(run_id) = run_logger.run_id() {
            if descriptor.synchronized && !response.body_is_empty() {
                run_logger.log("Reporting the invoker response").await;
                if let Err(e) = self
                    .port
                    .report_run_response(run_id, &response.body_value())
                    .await
                {
                    tracing::error!(run_id, error = %e, "failed to report run response");
                }
            }

            let report = self.transformer.report_plan(
                &event,
                mapping,
                &plan,
                &response,
                descriptor.synchronized,
            );
            if !report.is_empty() {
                run_logger.log("Reporting the run status").await;
                if let Err(e) = self
                    .port
                    .report_run_status(run_id, &report.to_patch())
                    .await
                {
                    tracing::error!(run_id, error = %e, "failed to report run status");
                }
            }
        }

        if !response.ok() {
            return Err(Error::DispatchStatus(response.status_code));
        }
        run_logger.log("Finished processing the run").await;
        Ok(())
    }

    async fn process_gitlab(
        &self,
        mut event: Value,
        descriptor: InvocationMethod,
        origin: EventOrigin,
        run_logger: RunLogger,
    ) -> Result<()> {
        // The GitLab target never sees the original headers, so the whole
        // block goes away during verification.
        if origin == EventOrigin::ActionRun
            && !crypto::verify_incoming_signature(
                &mut event,
                &self.settings.port_client_secret,
                true,
            )
        {
            return Ok(());
        }

        match self.gitlab.dispatch(&event, &descriptor, &run_logger).await? {
            Some(response) => {
                run_logger
                    .log(&format!(
                        "GitLab trigger responded with status code: {}",
                        response.status_code
                    ))
                    .await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EventProcessor for RunPipeline {
    async fn process(&self, event: Value, origin: EventOrigin) -> Result<()> {
        if self.settings.detailed_logging {
            debug!(event = %crypto::compact_json(&event), "raw event");
        }

        let Some(descriptor) = InvocationMethod::from_event(&event, origin) else {
            info!("skipping event: no invocation method");
            return Ok(());
        };
        if !descriptor.agent {
            info!("skipping event: not for agent");
            return Ok(());
        }
        let event_environments = events::environments(&event);
        if !self
            .settings
            .environments_allowed(event_environments.as_deref())
        {
            info!("skipping event: environments do not match this agent");
            return Ok(());
        }

        let run_id = events::run_id(&event).map(str::to_string);
        let run_logger = RunLogger::new(run_id, self.port.clone());
        run_logger.log("An action run was received by the agent").await;

        match descriptor.invocation_type {
            InvocationType::Webhook => {
                self.process_webhook(event, descriptor, origin, run_logger)
                    .await
            }
            InvocationType::Gitlab => {
                self.process_gitlab(event, descriptor, origin, run_logger)
                    .await
            }
            InvocationType::Unsupported => {
                info!("skipping event: unsupported invocation type");
                Ok(())
            }
        }
    }
}
