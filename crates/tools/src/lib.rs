//! The tool subsystem: executor contract, registry and dispatch.
//!
//! Tools are classified by [`ToolKind`]: function tools delegate to the
//! client (the loop pauses with `requires_action`), MCP tools call an
//! external MCP server, built-in tools run in-process against configured
//! search endpoints, and sandbox tools execute in an isolated pod over REST.

mod builtin;
mod function;
pub mod mcp;
mod sandbox;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use context::RequestContext;
use protocol::{ToolDefinition, ToolKind};

pub use builtin::BuiltinExecutor;
pub use function::FunctionExecutor;
pub use mcp::McpExecutor;
pub use sandbox::SandboxExecutor;

/// Tool-execution failures. The engine never fails a response on these; they
/// are fed back to the model as error outputs.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool execution timed out")]
    Timeout,
    #[error("tool transport error: {0}")]
    Transport(String),
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),
    #[error("tool unavailable: {0}")]
    Unavailable(String),
}

/// One tool invocation parsed from a `function_call` item, paired with the
/// definition it resolved to.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    /// JSON-encoded argument string, opaque to the dispatcher.
    pub arguments: String,
    pub definition: ToolDefinition,
}

/// What an executor produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Successful output to feed back as a `function_call_output` item.
    Output(String),
    /// The call must be executed by the client; the loop pauses.
    Delegate,
}

/// Executor contract: one implementation per [`ToolKind`].
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// The kind this executor serves.
    fn kind(&self) -> ToolKind;

    /// Whether this executor can run the given definition (endpoint
    /// configured, server known, and so on).
    fn can_execute(&self, definition: &ToolDefinition) -> bool;

    /// Run the call. Must honor context cancellation via the per-call
    /// timeout the engine wraps around it.
    async fn execute(&self, ctx: &RequestContext, call: &ToolCall) -> Result<ToolOutcome, ToolError>;
}

/// Kind-keyed executor registry.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<ToolKind, Arc<dyn ToolExecutor>>,
}

impl ExecutorRegistry {
    /// Build the full executor set from configuration. The function executor
    /// is always present; the rest depend on configured backends.
    pub fn from_config(config: &config::ToolsConfig) -> Self {
        let mut registry = Self::default();

        registry.register(Arc::new(FunctionExecutor));
        registry.register(Arc::new(BuiltinExecutor::new(&config.builtin)));
        registry.register(Arc::new(McpExecutor::new(&config.mcp)));

        if let Some(sandbox) = &config.sandbox {
            registry.register(Arc::new(SandboxExecutor::new(sandbox)));
        }

        registry
    }

    pub fn register(&mut self, executor: Arc<dyn ToolExecutor>) {
        self.executors.insert(executor.kind(), executor);
    }

    /// Find the executor for a definition, if one is registered and willing.
    pub fn for_definition(&self, definition: &ToolDefinition) -> Option<Arc<dyn ToolExecutor>> {
        let executor = self.executors.get(&definition.kind())?;

        if !executor.can_execute(definition) {
            return None;
        }

        Some(executor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn function_executor_delegates() {
        let registry = ExecutorRegistry::from_config(&config::ToolsConfig::default());
        let definition = ToolDefinition::function("get_weather", None, None);

        let executor = registry.for_definition(&definition).unwrap();
        assert_eq!(executor.kind(), ToolKind::Function);

        let call = ToolCall {
            call_id: "call_1".into(),
            name: "get_weather".into(),
            arguments: "{}".into(),
            definition,
        };

        let outcome = executor.execute(&RequestContext::default(), &call).await.unwrap();
        assert_eq!(outcome, ToolOutcome::Delegate);
    }

    #[test]
    fn unconfigured_builtin_has_no_executor() {
        let registry = ExecutorRegistry::from_config(&config::ToolsConfig::default());
        let definition: ToolDefinition = serde_json::from_value(serde_json::json!({ "type": "web_search" })).unwrap();

        assert!(registry.for_definition(&definition).is_none());
    }

    #[test]
    fn sandbox_executor_requires_configuration() {
        let registry = ExecutorRegistry::from_config(&config::ToolsConfig::default());
        let definition: ToolDefinition =
            serde_json::from_value(serde_json::json!({ "type": "code_interpreter" })).unwrap();

        assert!(registry.for_definition(&definition).is_none());
    }
}
