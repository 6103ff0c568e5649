//! Sandbox tool execution over the pod REST contract.
//!
//! Code never runs in-process: each call claims a sandbox through the pool
//! abstraction and drives `POST /execute` on it. The connection is mutually
//! authenticated with the workload-identity certificate when configured.

use async_trait::async_trait;
use config::SandboxConfig;
use context::RequestContext;
use protocol::{ToolDefinition, ToolKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{ToolCall, ToolError, ToolExecutor, ToolOutcome};

/// A claimed sandbox endpoint, valid for one execution.
pub struct SandboxLease {
    pub base_url: url::Url,
}

/// Hands out sandbox pods. The default implementation fronts a single
/// service endpoint; a cluster operator can substitute a real pod pool.
#[async_trait]
pub trait SandboxPool: Send + Sync {
    async fn claim(&self) -> Result<SandboxLease, ToolError>;
}

struct StaticPool {
    endpoint: url::Url,
}

#[async_trait]
impl SandboxPool for StaticPool {
    async fn claim(&self) -> Result<SandboxLease, ToolError> {
        Ok(SandboxLease {
            base_url: self.endpoint.clone(),
        })
    }
}

/// `POST /execute` request body.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ExecuteRequest {
    #[serde(default)]
    code: String,
    #[serde(default)]
    requirements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    env_name: Option<String>,
    #[serde(default)]
    timeout_seconds: u64,
    #[serde(default)]
    files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    python_index: Option<String>,
}

/// `POST /execute` response body.
#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    exit_code: i32,
    #[serde(default)]
    execution_time_ms: u64,
    #[serde(default)]
    files_produced: BTreeMap<String, String>,
}

pub struct SandboxExecutor {
    pool: Box<dyn SandboxPool>,
    client: reqwest::Client,
    execute_timeout: std::time::Duration,
}

impl SandboxExecutor {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            pool: Box::new(StaticPool {
                endpoint: config.endpoint.clone(),
            }),
            client: build_client(config),
            execute_timeout: config.execute_timeout,
        }
    }

    /// Substitute the pod pool, for operators with a real claim service.
    pub fn with_pool(mut self, pool: Box<dyn SandboxPool>) -> Self {
        self.pool = pool;
        self
    }
}

fn build_client(config: &SandboxConfig) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();

    if let Some(path) = &config.root_ca_path {
        match std::fs::read(path).map(|pem| reqwest::Certificate::from_pem(&pem)) {
            Ok(Ok(cert)) => builder = builder.add_root_certificate(cert),
            Ok(Err(e)) => log::error!("invalid sandbox root CA {}: {e}", path.display()),
            Err(e) => log::error!("failed to read sandbox root CA {}: {e}", path.display()),
        }
    }

    if let (Some(cert_path), Some(key_path)) = (&config.client_cert_path, &config.client_key_path) {
        let identity = std::fs::read(cert_path).and_then(|mut cert| {
            let key = std::fs::read(key_path)?;
            cert.push(b'\n');
            cert.extend_from_slice(&key);
            Ok(cert)
        });

        match identity.map(|pem| reqwest::Identity::from_pem(&pem)) {
            Ok(Ok(identity)) => builder = builder.identity(identity),
            Ok(Err(e)) => log::error!("invalid sandbox client identity: {e}"),
            Err(e) => log::error!("failed to read sandbox client identity: {e}"),
        }
    }

    builder.build().unwrap_or_default()
}

#[async_trait]
impl ToolExecutor for SandboxExecutor {
    fn kind(&self) -> ToolKind {
        ToolKind::Sandbox
    }

    fn can_execute(&self, definition: &ToolDefinition) -> bool {
        definition.tool_type == "code_interpreter"
    }

    async fn execute(&self, ctx: &RequestContext, call: &ToolCall) -> Result<ToolOutcome, ToolError> {
        let mut request: ExecuteRequest = serde_json::from_str(&call.arguments)
            .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))?;

        if request.code.is_empty() {
            return Err(ToolError::InvalidArguments("`code` must not be empty".to_string()));
        }

        if request.timeout_seconds == 0 {
            request.timeout_seconds = self.execute_timeout.as_secs();
        }

        let lease = self.pool.claim().await?;
        let url = lease
            .base_url
            .join("execute")
            .map_err(|e| ToolError::Unavailable(format!("invalid sandbox endpoint: {e}")))?;

        log::debug!("executing sandbox code for request {} on {url}", ctx.request_id);

        let response = self
            .client
            .post(url)
            .timeout(self.execute_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout
                } else {
                    ToolError::Transport(format!("sandbox call failed: {e}"))
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Transport(format!("sandbox returned {status}: {body}")));
        }

        let result: ExecuteResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Transport(format!("invalid sandbox response: {e}")))?;

        log::debug!(
            "sandbox execution finished: status={} exit_code={} elapsed={}ms",
            result.status,
            result.exit_code,
            result.execution_time_ms
        );

        Ok(ToolOutcome::Output(render_result(&result)))
    }
}

/// Render the execution result as the text fed back to the model.
fn render_result(result: &ExecuteResponse) -> String {
    let mut rendered = result.output.clone();

    if !result.stderr.is_empty() {
        if !rendered.is_empty() {
            rendered.push('\n');
        }
        rendered.push_str("[stderr]\n");
        rendered.push_str(&result.stderr);
    }

    if result.exit_code != 0 {
        if !rendered.is_empty() {
            rendered.push('\n');
        }
        rendered.push_str(&format!("[exit code {}]", result.exit_code));
    }

    if !result.files_produced.is_empty() {
        if !rendered.is_empty() {
            rendered.push('\n');
        }
        let names: Vec<&str> = result.files_produced.keys().map(String::as_str).collect();
        rendered.push_str(&format!("[produced files: {}]", names.join(", ")));
    }

    rendered
}
