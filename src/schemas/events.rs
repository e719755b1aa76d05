//! Run Event Schema
//!
//! Views over the JSON documents the control plane delivers. Events are kept
//! as raw `serde_json::Value` (their shape is user-extensible); this module
//! provides typed access to the well-known locations.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// Where an event came from; decides which location holds the destination
/// descriptor and whether status reporting applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// An action run from the `{org}.runs` topic or the polling transport.
    ActionRun,
    /// A state-change notification from `{org}.change.log`; carries no run id.
    Changelog,
}

/// Destination type of an invocation descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub enum InvocationType {
    #[serde(rename = "WEBHOOK")]
    #[default]
    Webhook,
    #[serde(rename = "GITLAB")]
    Gitlab,
    #[serde(other)]
    Unsupported,
}

/// The per-action destination configuration attached to each event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvocationMethod {
    #[serde(rename = "type")]
    pub invocation_type: InvocationType,
    /// `false` means the run is not meant for an agent; skip it.
    pub agent: bool,
    pub url: Option<String>,
    pub method: Option<String>,
    pub synchronized: bool,
    pub headers: HashMap<String, String>,
    pub group_name: Option<String>,
    pub project_name: Option<String>,
    pub default_ref: Option<String>,
    pub omit_payload: bool,
    pub omit_user_inputs: bool,
}

impl InvocationMethod {
    /// Parse the descriptor out of an event, looking at the location that
    /// matches the event's origin.
    pub fn from_event(event: &Value, origin: EventOrigin) -> Option<Self> {
        let raw = invocation_method_object(event, origin)?;
        serde_json::from_value(raw.clone()).ok()
    }
}

/// The raw destination descriptor: `payload.action.invocationMethod` for
/// runs, `changelogDestination` for changelog events.
pub fn invocation_method_object(event: &Value, origin: EventOrigin) -> Option<&Value> {
    match origin {
        EventOrigin::ActionRun => event
            .get("payload")?
            .get("action")?
            .get("invocationMethod"),
        EventOrigin::Changelog => event.get("changelogDestination"),
    }
}

/// `context.runId`, present on action runs, absent on changelog events.
pub fn run_id(event: &Value) -> Option<&str> {
    event.get("context")?.get("runId")?.as_str()
}

/// `payload.properties`: the user-supplied action inputs.
pub fn user_inputs(event: &Value) -> Value {
    event
        .get("payload")
        .and_then(|p| p.get("properties"))
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()))
}

/// Top-level `environments` list, when the control plane scopes the run.
pub fn environments(event: &Value) -> Option<Vec<String>> {
    let list = event.get("environments")?.as_array()?;
    Some(
        list.iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}

/// Captured outcome of an outbound dispatch.
#[derive(Debug, Clone)]
pub struct ResponseView {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub text: String,
    /// Parsed body, `None` when the body is not valid JSON.
    pub json: Option<Value>,
}

impl ResponseView {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// The `{statusCode, headers, text, json}` dict exposed to report
    /// templates.
    pub fn to_context_value(&self) -> Value {
        serde_json::json!({
            "statusCode": self.status_code,
            "headers": self.headers,
            "text": self.text,
            "json": self.json.clone().unwrap_or(Value::Null),
        })
    }

    /// The body to feed back on synchronized invocations: parsed JSON when
    /// possible, the raw text otherwise.
    pub fn body_value(&self) -> Value {
        match &self.json {
            Some(json) => json.clone(),
            None => Value::String(self.text.clone()),
        }
    }

    pub fn body_is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
