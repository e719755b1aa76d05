//! Control-the-payload Mapping Schema
//!
//! The declarative payload-transformation config: an ordered list of
//! mappings loaded once at startup. The first mapping whose `enabled`
//! predicate holds wins; there is no merging across entries.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// `enabled` is either a boolean literal or a filter expression evaluated
/// against the event.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Enabled {
    Literal(bool),
    Expression(String),
}

impl Default for Enabled {
    fn default() -> Self {
        Enabled::Literal(true)
    }
}

/// Template for the status-report payload overlaid onto the defaults.
/// Each field is a literal or expression evaluated against
/// `{body, request, response}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportMapping {
    pub status: Option<Value>,
    pub link: Option<Value>,
    pub summary: Option<Value>,
    #[serde(rename = "externalRunId")]
    pub external_run_id: Option<Value>,
}

/// One entry of the control-the-payload config.
///
/// The request-shape fields (`method`, `url`, `body`, `headers`, `query`)
/// are kept as raw JSON: strings are expressions, objects and arrays are
/// structured templates recursed into key-wise, other scalars pass through.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Mapping {
    #[serde(default)]
    pub enabled: Enabled,
    pub method: Option<Value>,
    pub url: Option<Value>,
    pub body: Option<Value>,
    pub headers: Option<Value>,
    pub query: Option<Value>,
    pub report: Option<ReportMapping>,
    #[serde(default, rename = "fieldsToDecryptPaths")]
    pub fields_to_decrypt_paths: Vec<String>,
}

/// Load the mapping file. A missing path yields an empty list (the agent
/// then passes events through with destination defaults); a present but
/// unparseable file is a startup error.
pub fn load_mappings(path: &Path) -> Result<Vec<Mapping>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Mapping(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| Error::Mapping(format!("failed to parse {}: {e}", path.display())))
}
