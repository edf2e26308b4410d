/// Request parameter and response mappings for dynamic approver lookups.

use crate::error::EvaluationError;
use crate::runtime::{json_type_name, lookup_path, NodeContext, ValueSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extract one value from the task and send it as `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamMapping {
    #[serde(default)]
    pub source: ValueSource,
    /// Dotted path; for `node_outputs` the first segment is the node ID
    pub path: String,
    /// Query parameter or body key the value is sent under
    pub target: String,
}

impl ParamMapping {
    pub fn new(source: ValueSource, path: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source,
            path: path.into(),
            target: target.into(),
        }
    }

    /// Resolve the mapped value from the running node's context
    pub fn extract(&self, ctx: &NodeContext<'_>) -> Result<Value, EvaluationError> {
        match self.source {
            ValueSource::TaskParams => lookup_path(ctx.params, &self.path)
                .cloned()
                .ok_or_else(|| EvaluationError::MissingField(self.path.clone())),
            ValueSource::NodeOutputs => {
                let (node_id, rest) = match self.path.split_once('.') {
                    Some((node_id, rest)) => (node_id, rest),
                    None => (self.path.as_str(), ""),
                };
                if node_id.is_empty() {
                    return Err(EvaluationError::MissingNodeId);
                }
                let output = ctx
                    .outputs
                    .get(node_id)
                    .ok_or_else(|| EvaluationError::MissingNodeOutput(node_id.to_string()))?;
                lookup_path(output, rest)
                    .cloned()
                    .ok_or_else(|| EvaluationError::MissingField(self.path.clone()))
            }
            ValueSource::Context => ctx
                .cache_get(&self.path)
                .ok_or_else(|| EvaluationError::MissingField(self.path.clone())),
        }
    }
}

/// Where the approver list sits in the response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMapping {
    /// Dotted path to an array of strings; empty means the body itself
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "json".to_string()
}

impl Default for ResponseMapping {
    fn default() -> Self {
        Self {
            path: String::new(),
            format: default_format(),
        }
    }
}

impl ResponseMapping {
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format: default_format(),
        }
    }

    /// Parse `body` and pull the approver IDs out of it
    pub fn extract_approvers(&self, body: &[u8]) -> anyhow::Result<Vec<String>> {
        if !self.format.eq_ignore_ascii_case("json") {
            anyhow::bail!("unsupported response format '{}'", self.format);
        }

        let document: Value = serde_json::from_slice(body)
            .map_err(|e| anyhow::anyhow!("response body is not valid JSON: {e}"))?;
        let target = lookup_path(&document, &self.path).ok_or_else(|| {
            anyhow::anyhow!("response path '{}' not found", self.path)
        })?;

        let items = target.as_array().ok_or_else(|| {
            anyhow::anyhow!(
                "response path '{}' must be an array of strings, found {}",
                self.path,
                json_type_name(target)
            )
        })?;

        items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    anyhow::anyhow!(
                        "approver entries must be strings, found {}",
                        json_type_name(item)
                    )
                })
            })
            .collect()
    }
}

/// String form used for query parameters: scalars verbatim, others as JSON
pub(crate) fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
