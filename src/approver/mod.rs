/// Approver sourcing
///
/// An approval node either lists its approvers up front or looks them up from
/// an external HTTP endpoint when the task is created or the node activates.

// Dynamic HTTP-backed resolver with retry
pub mod dynamic;

// HTTP capability and the bundled reqwest transport
pub mod http;

// Parameter extraction and response parsing for dynamic lookups
pub mod mapping;

use crate::error::{FlowError, Result};
use crate::runtime::NodeContext;
use serde::{Deserialize, Serialize};

pub use dynamic::{send_with_retry, DynamicApproverConfig, HttpApiConfig};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use mapping::{ParamMapping, ResponseMapping};

/// When a node's approvers are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverTiming {
    /// While the task is being created
    OnCreate,
    /// When the node becomes the current node
    #[default]
    OnActivate,
}

/// Static approver list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedApproverConfig {
    pub approvers: Vec<String>,
}

/// Source of an approval node's approvers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApproverConfig {
    Fixed(FixedApproverConfig),
    Dynamic(DynamicApproverConfig),
}

impl ApproverConfig {
    pub fn fixed(approvers: Vec<String>) -> Self {
        Self::Fixed(FixedApproverConfig { approvers })
    }

    pub fn dynamic(config: DynamicApproverConfig) -> Self {
        Self::Dynamic(config)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Fixed(_) => "fixed",
            Self::Dynamic(_) => "dynamic",
        }
    }

    /// Fixed lists are known up front and are seeded at task creation
    pub fn timing(&self) -> ApproverTiming {
        match self {
            Self::Fixed(_) => ApproverTiming::OnCreate,
            Self::Dynamic(config) => config.timing,
        }
    }

    /// Number of approvers when the list is static
    pub fn fixed_count(&self) -> Option<usize> {
        match self {
            Self::Fixed(config) => Some(config.approvers.len()),
            Self::Dynamic(_) => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Fixed(config) => {
                if config.approvers.is_empty() {
                    return Err(FlowError::invalid_template(
                        "fixed approver list must not be empty",
                    ));
                }
                if config.approvers.iter().any(String::is_empty) {
                    return Err(FlowError::invalid_template("approver IDs must not be empty"));
                }
                Ok(())
            }
            Self::Dynamic(config) => config.validate(),
        }
    }

    /// Resolve the approver list for the node in `ctx`
    pub async fn get_approvers(&self, ctx: &NodeContext<'_>) -> Result<Vec<String>> {
        match self {
            Self::Fixed(config) => Ok(config.approvers.clone()),
            Self::Dynamic(config) => config.resolve(ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fixed_config_is_tagged() {
        let config: ApproverConfig =
            serde_json::from_value(json!({ "type": "fixed", "approvers": ["u1"] })).unwrap();
        assert_eq!(config.fixed_count(), Some(1));
        assert_eq!(config.timing(), ApproverTiming::OnCreate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn dynamic_config_parses_with_defaults() {
        let config: ApproverConfig = serde_json::from_value(json!({
            "type": "dynamic",
            "api": {
                "url": "https://hr.example.com/approvers",
                "param_mapping": { "source": "task_params", "path": "dept", "target": "dept" },
                "response_mapping": { "path": "data.approvers" }
            },
            "timing": "on_create"
        }))
        .unwrap();

        let ApproverConfig::Dynamic(dynamic) = &config else {
            panic!("expected dynamic config");
        };
        assert_eq!(dynamic.timing, ApproverTiming::OnCreate);
        assert_eq!(dynamic.api.http_method().unwrap(), HttpMethod::Get);
        assert_eq!(dynamic.api.response_mapping.format, "json");
        assert!(dynamic.http_client.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_fixed_list_is_invalid() {
        assert!(ApproverConfig::fixed(vec![]).validate().is_err());
        assert!(ApproverConfig::fixed(vec![String::new()]).validate().is_err());
    }
}
