/// Dynamic approver resolution over HTTP
///
/// Builds a request from the task data, sends it through the injected
/// [`HttpClient`] with exponential back-off, and reads the approver IDs out
/// of the JSON response.

use super::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use super::mapping::{query_value, ParamMapping, ResponseMapping};
use super::ApproverTiming;
use crate::config::RetryPolicy;
use crate::error::{FlowError, Result};
use crate::runtime::NodeContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Approvers fetched from an external endpoint
#[derive(Clone, Serialize, Deserialize)]
pub struct DynamicApproverConfig {
    pub api: HttpApiConfig,
    #[serde(default)]
    pub timing: ApproverTiming,
    /// Transport for this node only; falls back to the manager's client
    #[serde(skip)]
    pub http_client: Option<Arc<dyn HttpClient>>,
}

impl std::fmt::Debug for DynamicApproverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicApproverConfig")
            .field("api", &self.api)
            .field("timing", &self.timing)
            .field("http_client", &self.http_client.as_ref().map(|_| "<dyn HttpClient>"))
            .finish()
    }
}

impl DynamicApproverConfig {
    pub fn new(api: HttpApiConfig) -> Self {
        Self {
            api,
            timing: ApproverTiming::default(),
            http_client: None,
        }
    }

    pub fn with_timing(mut self, timing: ApproverTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.api.validate()
    }

    /// Fetch the approver list for the node in `ctx`
    pub async fn resolve(&self, ctx: &NodeContext<'_>) -> Result<Vec<String>> {
        self.api.validate()?;

        let client = self
            .http_client
            .clone()
            .or_else(|| ctx.http_client.clone())
            .ok_or_else(|| {
                FlowError::InvalidOperation(format!(
                    "node '{}' uses dynamic approvers but no HTTP client is configured",
                    ctx.node.id
                ))
            })?;

        let request = self.api.build_request(ctx)?;
        tracing::debug!(
            "🌐 Resolving approvers for node '{}' via {} {}",
            ctx.node.id,
            request.method,
            request.url
        );

        let (response, attempts) = send_with_retry(client.as_ref(), &request, ctx.retry).await?;
        let approvers = self
            .api
            .response_mapping
            .extract_approvers(&response.body)
            .map_err(|source| FlowError::ApproverResolution {
                url: self.api.url.clone(),
                attempts,
                source,
            })?;

        tracing::info!(
            "✅ Resolved {} approver(s) for node '{}' in {} attempt(s)",
            approvers.len(),
            ctx.node.id,
            attempts
        );
        Ok(approvers)
    }
}

/// Endpoint description for a dynamic approver lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpApiConfig {
    pub url: String,
    /// Case-insensitive; empty means `GET`
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_mapping: Option<ParamMapping>,
    #[serde(default)]
    pub response_mapping: ResponseMapping,
}

impl HttpApiConfig {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get.as_str().to_string(),
            headers: HashMap::new(),
            param_mapping: None,
            response_mapping: ResponseMapping::default(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_param_mapping(mut self, mapping: ParamMapping) -> Self {
        self.param_mapping = Some(mapping);
        self
    }

    pub fn with_response_path(mut self, path: impl Into<String>) -> Self {
        self.response_mapping = ResponseMapping::at(path);
        self
    }

    /// Normalized method
    pub fn http_method(&self) -> Result<HttpMethod> {
        HttpMethod::parse(&self.method).ok_or_else(|| {
            FlowError::invalid_template(format!("unsupported HTTP method '{}'", self.method))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(FlowError::invalid_template("dynamic approver api url is required"));
        }
        let url = reqwest::Url::parse(&self.url).map_err(|e| {
            FlowError::invalid_template(format!("invalid approver api url '{}': {e}", self.url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FlowError::invalid_template(format!(
                "approver api url '{}' must use http or https",
                self.url
            )));
        }
        self.http_method()?;
        if let Some(mapping) = &self.param_mapping {
            if mapping.target.is_empty() {
                return Err(FlowError::invalid_template(
                    "param_mapping requires a target name",
                ));
            }
        }
        Ok(())
    }

    /// Build the outbound request for the node in `ctx`
    pub fn build_request(&self, ctx: &NodeContext<'_>) -> Result<HttpRequest> {
        let method = self.http_method()?;
        let mapped = self
            .param_mapping
            .as_ref()
            .map(|mapping| mapping.extract(ctx).map(|value| (mapping.target.as_str(), value)))
            .transpose()?;

        let mut url = reqwest::Url::parse(&self.url).map_err(|e| {
            FlowError::invalid_template(format!("invalid approver api url '{}': {e}", self.url))
        })?;
        let mut headers = self.headers.clone();

        let body = if method == HttpMethod::Get {
            if let Some((target, value)) = &mapped {
                url.query_pairs_mut().append_pair(target, &query_value(value));
            }
            None
        } else {
            let payload = match mapped {
                Some((target, value)) => {
                    let mut body = serde_json::Map::new();
                    body.insert(target.to_string(), value);
                    Value::Object(body)
                }
                None => ctx.params.clone(),
            };
            if !headers.keys().any(|key| key.eq_ignore_ascii_case("content-type")) {
                headers.insert("Content-Type".to_string(), "application/json".to_string());
            }
            let bytes = serde_json::to_vec(&payload).map_err(|e| {
                FlowError::InvalidOperation(format!("failed to encode approver request body: {e}"))
            })?;
            Some(bytes)
        };

        Ok(HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        })
    }
}

/// Send `request` until a 2xx arrives or the policy is exhausted
///
/// Returns the successful response and the number of attempts it took.
pub async fn send_with_retry(
    client: &dyn HttpClient,
    request: &HttpRequest,
    policy: RetryPolicy,
) -> Result<(HttpResponse, u32)> {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = anyhow::anyhow!("no attempt made");

    for attempt in 1..=max_attempts {
        match client.send(request.clone()).await {
            Ok(response) if response.is_success() => return Ok((response, attempt)),
            Ok(response) => {
                last_error = anyhow::anyhow!(
                    "{} {} returned status {}",
                    request.method,
                    request.url,
                    response.status
                );
            }
            Err(e) => last_error = e,
        }

        tracing::warn!(
            "⚠️ Approver lookup attempt {}/{} failed: {}",
            attempt,
            max_attempts,
            last_error
        );

        if attempt < max_attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    tracing::error!(
        "❌ Approver lookup via {} failed after {} attempt(s)",
        request.url,
        max_attempts
    );
    Err(FlowError::ApproverResolution {
        url: request.url.clone(),
        attempts: max_attempts,
        source: last_error,
    })
}
