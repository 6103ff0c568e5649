//! Built-in server-side tools (web search, file search).
//!
//! Each built-in tool is backed by a configured HTTP endpoint; the tool's
//! JSON arguments are posted as-is and the response body is fed back to the
//! model. The search backend itself (SearXNG, a vector store) is outside
//! this process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use config::BuiltinToolConfig;
use context::RequestContext;
use protocol::{ToolDefinition, ToolKind};
use serde_json::Value;

use crate::{ToolCall, ToolError, ToolExecutor, ToolOutcome};

pub struct BuiltinExecutor {
    endpoints: BTreeMap<String, BuiltinToolConfig>,
    client: reqwest::Client,
}

impl BuiltinExecutor {
    pub fn new(config: &BTreeMap<String, BuiltinToolConfig>) -> Self {
        Self {
            endpoints: config.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ToolExecutor for BuiltinExecutor {
    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }

    fn can_execute(&self, definition: &ToolDefinition) -> bool {
        self.endpoints.contains_key(&definition.tool_type)
    }

    async fn execute(&self, ctx: &RequestContext, call: &ToolCall) -> Result<ToolOutcome, ToolError> {
        let config = self
            .endpoints
            .get(&call.definition.tool_type)
            .ok_or_else(|| ToolError::Unavailable(format!("no endpoint configured for {}", call.definition.tool_type)))?;

        let arguments: Value = serde_json::from_str(&call.arguments)
            .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))?;

        log::debug!(
            "executing builtin tool {} for request {}",
            call.definition.tool_type,
            ctx.request_id
        );

        let response = self
            .client
            .post(config.endpoint.clone())
            .timeout(config.timeout)
            .json(&arguments)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout
                } else {
                    ToolError::Transport(format!("builtin tool call failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Transport(format!("failed to read tool response: {e}")))?;

        if !status.is_success() {
            return Err(ToolError::Transport(format!(
                "builtin tool endpoint returned {status}: {body}"
            )));
        }

        Ok(ToolOutcome::Output(body))
    }
}
