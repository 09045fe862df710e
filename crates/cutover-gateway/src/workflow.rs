//! GitHub Actions `workflow_dispatch` as a fallback action

use cutover_core::{FallbackAction, FallbackError, FallbackOutcome};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Default GitHub REST API base
pub const GITHUB_API: &str = "https://api.github.com";

/// Triggers a workflow with the operation and its parameters as inputs
#[derive(Debug, Clone)]
pub struct WorkflowDispatch {
    client: reqwest::Client,
    api_base: String,
    repository: String,
    workflow: String,
    git_ref: String,
}

impl WorkflowDispatch {
    /// Dispatcher for `workflow` (file name or id) in `owner/repo`
    ///
    /// # Errors
    /// [`FallbackError::ActionFailed`] for an unusable token or client
    pub fn new(token: &str, repository: impl Into<String>, workflow: impl Into<String>) -> Result<Self, FallbackError> {
        let failed = |message: String| FallbackError::ActionFailed {
            action: "workflow-dispatch".to_string(),
            message,
        };
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| failed("invalid token".to_string()))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("cutover/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| failed(e.to_string()))?;

        Ok(Self {
            client,
            api_base: GITHUB_API.to_string(),
            repository: repository.into(),
            workflow: workflow.into(),
            git_ref: "main".to_string(),
        })
    }

    /// Branch or tag to run on
    #[must_use]
    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = git_ref.into();
        self
    }

    /// Alternate API base (GitHub Enterprise)
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn dispatch_url(&self) -> String {
        format!(
            "{}/repos/{}/actions/workflows/{}/dispatches",
            self.api_base, self.repository, self.workflow
        )
    }

    fn failed(&self, message: impl Into<String>) -> FallbackError {
        FallbackError::ActionFailed {
            action: self.name().to_string(),
            message: message.into(),
        }
    }
}

/// Dispatch body; workflow inputs must be strings
#[must_use]
pub fn dispatch_body(git_ref: &str, operation: &str, params: &Value) -> Value {
    let mut inputs = Map::new();
    if let Some(params) = params.as_object() {
        for (key, value) in params {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            inputs.insert(key.clone(), Value::String(value));
        }
    }
    inputs.insert("operation".to_string(), Value::String(operation.to_string()));
    json!({ "ref": git_ref, "inputs": inputs })
}

#[async_trait::async_trait]
impl FallbackAction for WorkflowDispatch {
    fn name(&self) -> &str {
        "workflow-dispatch"
    }

    async fn run(&self, operation: &str, params: &Value) -> Result<FallbackOutcome, FallbackError> {
        let response = self
            .client
            .post(self.dispatch_url())
            .json(&dispatch_body(&self.git_ref, operation, params))
            .send()
            .await
            .map_err(|e| self.failed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.failed(format!("{status}: {body}")));
        }

        tracing::info!("dispatched {} on {} for {}", self.workflow, self.git_ref, operation);
        Ok(FallbackOutcome {
            operation: operation.to_string(),
            action: self.name().to_string(),
            detail: json!({
                "repository": self.repository,
                "workflow": self.workflow,
                "ref": self.git_ref,
            }),
        })
    }
}
