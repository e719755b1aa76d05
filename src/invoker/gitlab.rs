//! GitLab pipeline-trigger dispatcher.
//!
//! Resolves the project trigger token from the environment (variable named
//! `<group>_<project>` with slashes replaced by underscores), composes the
//! trigger body and posts to the GitLab API. Missing prerequisites skip the
//! event rather than failing it.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::info;

use crate::config::Settings;
use crate::crypto;
use crate::error::{Error, Result};
use crate::schemas::events::{self, InvocationMethod, ResponseView};

use super::RunLogger;

const DEFAULT_REF: &str = "main";

pub struct GitLabInvoker {
    http: reqwest::Client,
    timeout: Duration,
    base_url: String,
}

impl GitLabInvoker {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            timeout: settings.gitlab_pipeline_invoker_timeout,
            base_url: settings.gitlab_url.trim_end_matches('/').to_string(),
        })
    }

    /// Trigger the project pipeline for this event. Returns `None` when the
    /// event is skipped (missing project path or trigger token); statuses of
    /// 400 and above are dispatch errors.
    pub async fn dispatch(
        &self,
        event: &Value,
        descriptor: &InvocationMethod,
        run_logger: &RunLogger,
    ) -> Result<Option<ResponseView>> {
        let (Some(group), Some(project)) = (
            descriptor.group_name.as_deref().filter(|s| !s.is_empty()),
            descriptor.project_name.as_deref().filter(|s| !s.is_empty()),
        ) else {
            info!("skipping event: GitLab project path is missing");
            return Ok(None);
        };

        let token_variable = format!("{group}_{}", project.replace('/', "_"));
        let Some(token) = std::env::var(&token_variable).ok().filter(|t| !t.is_empty()) else {
            info!(
                variable = %token_variable,
                "skipping event: no trigger token env variable found for project {group}/{project}"
            );
            return Ok(None);
        };

        let user_inputs = events::user_inputs(event);
        let git_ref = user_inputs
            .get("ref")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| descriptor.default_ref.clone())
            .unwrap_or_else(|| DEFAULT_REF.to_string());

        let mut body = Map::new();
        body.insert("token".to_string(), Value::String(token));
        body.insert("ref".to_string(), Value::String(git_ref));
        if !descriptor.omit_user_inputs {
            // GitLab pipeline variables must be strings.
            let variables: HashMap<String, String> = user_inputs
                .as_object()
                .map(|inputs| {
                    inputs
                        .iter()
                        .map(|(key, value)| (key.clone(), stringify(value)))
                        .collect()
                })
                .unwrap_or_default();
            body.insert(
                "variables".to_string(),
                serde_json::to_value(variables).unwrap_or_default(),
            );
        }
        if !descriptor.omit_payload {
            body.insert("port_payload".to_string(), event.clone());
        }

        let project_path = urlencoding::encode(&format!("{group}/{project}")).into_owned();
        let url = format!(
            "{}/api/v4/projects/{project_path}/trigger/pipeline",
            self.base_url
        );

        run_logger
            .log(&format!(
                "Triggering GitLab pipeline for project {group}/{project}"
            ))
            .await;

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&Value::Object(body))
            .send()
            .await
            .map_err(|e| Error::Dispatch(format!("request to {url} failed: {e}")))?;

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

        info!(group, project, status_code, "gitlab dispatch finished");
        if status_code >= 400 {
            return Err(Error::DispatchStatus(status_code));
        }

        let json = serde_json::from_str(&text).ok();
        Ok(Some(ResponseView {
            status_code,
            headers,
            text,
            json,
        }))
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => crypto::compact_json(other),
    }
}
