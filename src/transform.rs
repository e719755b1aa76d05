//! Payload Transformer
//!
//! Applies the first enabled mapping to an event, producing the outbound
//! [`RequestPlan`] and, after dispatch, the [`ReportPlan`] patched back to
//! the control plane. Request-shape expressions are evaluated against the
//! event document; report expressions see `{body, request, response}`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::crypto;
use crate::expr;
use crate::schemas::events::{InvocationMethod, ResponseView};
use crate::schemas::mapping::{Enabled, Mapping};

pub const DEFAULT_HTTP_METHOD: &str = "POST";

/// Post-transformation description of the outbound request.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub method: String,
    pub url: String,
    pub body: Value,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
}

impl RequestPlan {
    /// The `request` object exposed to report templates.
    pub fn to_context_value(&self) -> Value {
        json!({
            "method": self.method,
            "url": self.url,
            "body": self.body,
            "headers": self.headers,
            "query": self.query,
        })
    }
}

/// Post-dispatch description of the status patch. Null fields are omitted
/// on the wire; an all-null plan is not sent at all.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportPlan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(rename = "externalRunId", skip_serializing_if = "Option::is_none")]
    pub external_run_id: Option<Value>,
}

impl ReportPlan {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.link.is_none()
            && self.summary.is_none()
            && self.external_run_id.is_none()
    }

    pub fn to_patch(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }
}

pub struct Transformer {
    mappings: Arc<Vec<Mapping>>,
    secret: String,
}

impl Transformer {
    pub fn new(mappings: Arc<Vec<Mapping>>, secret: String) -> Self {
        Self { mappings, secret }
    }

    /// The first mapping whose `enabled` predicate holds for this event.
    /// At most one mapping is ever selected; no merging across entries.
    pub fn select_mapping(&self, event: &Value) -> Option<&Mapping> {
        self.mappings.iter().find(|mapping| match &mapping.enabled {
            Enabled::Literal(enabled) => *enabled,
            Enabled::Expression(expression) => {
                matches!(expr::first(expression, event), Some(Value::Bool(true)))
            }
        })
    }

    /// Decrypt the mapping's designated fields in place. The caller owns a
    /// working copy of the event; input documents upstream are untouched.
    pub fn decrypt_fields(&self, event: &mut Value, mapping: &Mapping) {
        if !mapping.fields_to_decrypt_paths.is_empty() {
            crypto::decrypt_payload_fields(event, &mapping.fields_to_decrypt_paths, &self.secret);
        }
    }

    /// Build the outbound request: destination defaults, overridden by the
    /// mapping's evaluated fields.
    pub fn request_plan(
        &self,
        event: &Value,
        descriptor: &InvocationMethod,
        mapping: Option<&Mapping>,
    ) -> RequestPlan {
        let mut plan = RequestPlan {
            method: descriptor
                .method
                .clone()
                .unwrap_or_else(|| DEFAULT_HTTP_METHOD.to_string()),
            url: descriptor.url.clone().unwrap_or_default(),
            body: event.clone(),
            headers: HashMap::new(),
            query: HashMap::new(),
        };

        let Some(mapping) = mapping else {
            return plan;
        };

        if let Some(template) = &mapping.method {
            if let Some(method) = scalar_to_string(&apply_template(template, event)) {
                plan.method = method;
            }
        }
        if let Some(template) = &mapping.url {
            if let Some(url) = scalar_to_string(&apply_template(template, event)) {
                plan.url = url;
            }
        }
        if let Some(template) = &mapping.body {
            plan.body = apply_template(template, event);
        }
        if let Some(template) = &mapping.headers {
            plan.headers = string_map(&apply_template(template, event));
        }
        if let Some(template) = &mapping.query {
            plan.query = string_map(&apply_template(template, event));
        }
        plan
    }

    /// Build the status patch: response-derived defaults overlaid with the
    /// mapping's `report` template.
    pub fn report_plan(
        &self,
        event: &Value,
        mapping: Option<&Mapping>,
        request: &RequestPlan,
        response: &ResponseView,
        synchronized: bool,
    ) -> ReportPlan {
        let mut plan = ReportPlan::default();
        if !response.ok() {
            plan.status = Some("FAILURE".to_string());
            plan.summary = Some(Value::String(format!(
                "Invoker failed with status code: {}",
                response.status_code
            )));
        } else if synchronized {
            plan.status = Some("SUCCESS".to_string());
        }

        let Some(report) = mapping.and_then(|m| m.report.as_ref()) else {
            return plan;
        };

        let context = json!({
            "body": event,
            "request": request.to_context_value(),
            "response": response.to_context_value(),
        });

        if let Some(template) = &report.status {
            plan.status = scalar_to_string(&apply_template(template, &context));
        }
        if let Some(template) = &report.link {
            plan.link = non_null(apply_template(template, &context));
        }
        if let Some(template) = &report.summary {
            plan.summary = non_null(apply_template(template, &context));
        }
        if let Some(template) = &report.external_run_id {
            plan.external_run_id = non_null(apply_template(template, &context));
        }
        plan
    }
}

/// Recursively evaluate a template: objects and arrays recurse, strings run
/// through the expression engine (failures become null), other scalars pass
/// through untouched.
fn apply_template(template: &Value, doc: &Value) -> Value {
    match template {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), apply_template(value, doc)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| apply_template(item, doc)).collect())
        }
        Value::String(expression) => expr::first(expression, doc).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// Flatten an evaluated headers/query template into string pairs. Null
/// entries are dropped; non-string scalars are stringified; structures are
/// serialized compactly.
fn string_map(value: &Value) -> HashMap<String, String> {
    let Some(map) = value.as_object() else {
        return HashMap::new();
    };
    map.iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key.clone(), s.clone())),
            Value::Bool(b) => Some((key.clone(), b.to_string())),
            Value::Number(n) => Some((key.clone(), n.to_string())),
            other => Some((key.clone(), crypto::compact_json(other))),
        })
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_null(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        other => Some(other),
    }
}
