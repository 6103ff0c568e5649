//! Client-executed function tools.

use async_trait::async_trait;
use context::RequestContext;
use protocol::{ToolDefinition, ToolKind};

use crate::{ToolCall, ToolError, ToolExecutor, ToolOutcome};

/// Function tools run on the client. This executor never executes anything;
/// it returns the delegate signal so the loop pauses with `requires_action`.
pub struct FunctionExecutor;

#[async_trait]
impl ToolExecutor for FunctionExecutor {
    fn kind(&self) -> ToolKind {
        ToolKind::Function
    }

    fn can_execute(&self, _definition: &ToolDefinition) -> bool {
        true
    }

    async fn execute(&self, _ctx: &RequestContext, _call: &ToolCall) -> Result<ToolOutcome, ToolError> {
        Ok(ToolOutcome::Delegate)
    }
}
