//! Outbound translation: `ProviderRequest` → Chat Completions wire request.
//!
//! Built-in tool types are expanded into synthetic function definitions here;
//! the engine sends them through untouched.

use protocol::{ToolDefinition, ToolKind};
use serde_json::{Value, json};

use crate::request::{ProviderContent, ProviderMessage, ProviderPart, ProviderRequest, ProviderRole};

use super::wire;

pub(super) fn to_wire(request: ProviderRequest, stream: bool) -> wire::ChatCompletionRequest {
    let messages = request.messages.iter().map(to_wire_message).collect();

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(request.tools.iter().map(expand_tool).collect())
    };

    let stream_options = stream.then_some(wire::StreamOptions { include_usage: true });

    wire::ChatCompletionRequest {
        model: request.model,
        messages,
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_output_tokens,
        frequency_penalty: request.frequency_penalty,
        presence_penalty: request.presence_penalty,
        logprobs: request.top_logprobs.map(|_| true),
        top_logprobs: request.top_logprobs,
        stream,
        stream_options,
        tools,
        tool_choice: request
            .tool_choice
            .as_ref()
            .and_then(|choice| serde_json::to_value(choice).ok()),
        parallel_tool_calls: request.parallel_tool_calls,
        response_format: request.response_format,
        extra: request.extensions,
    }
}

fn to_wire_message(message: &ProviderMessage) -> wire::ChatMessage {
    let role = match message.role {
        ProviderRole::System => "system",
        ProviderRole::User => "user",
        ProviderRole::Assistant => "assistant",
        ProviderRole::Tool => "tool",
    };

    let content = match &message.content {
        ProviderContent::Text(text) if text.is_empty() && !message.tool_calls.is_empty() => None,
        ProviderContent::Text(text) => Some(Value::String(text.clone())),
        ProviderContent::Parts(parts) => Some(Value::Array(parts.iter().map(to_wire_part).collect())),
    };

    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|call| wire::ToolCall {
                    id: call.id.clone(),
                    tool_type: "function".to_string(),
                    function: wire::FunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        )
    };

    wire::ChatMessage {
        role,
        content,
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
        reasoning_content: message.reasoning_content.clone(),
    }
}

fn to_wire_part(part: &ProviderPart) -> Value {
    match part {
        ProviderPart::Text { text } => json!({ "type": "text", "text": text }),
        ProviderPart::ImageUrl { url } => json!({ "type": "image_url", "image_url": { "url": url } }),
        ProviderPart::Audio { data, format } => {
            json!({ "type": "input_audio", "input_audio": { "data": data, "format": format } })
        }
    }
}

/// Function tools pass through; built-in and other server-side tool types
/// become synthetic function definitions the backend can call by name.
fn expand_tool(tool: &ToolDefinition) -> wire::Tool {
    let function = match tool.kind() {
        ToolKind::Function => wire::FunctionDefinition {
            name: tool.effective_name().to_string(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone().unwrap_or_else(|| json!({ "type": "object" })),
            strict: tool.strict,
        },
        _ => wire::FunctionDefinition {
            name: tool.effective_name().to_string(),
            description: tool
                .description
                .clone()
                .or_else(|| synthetic_description(&tool.tool_type)),
            parameters: tool
                .parameters
                .clone()
                .unwrap_or_else(|| synthetic_parameters(&tool.tool_type)),
            strict: None,
        },
    };

    wire::Tool {
        tool_type: "function",
        function,
    }
}

fn synthetic_description(tool_type: &str) -> Option<String> {
    let description = match tool_type {
        "web_search" => "Search the web for up-to-date information.",
        "file_search" => "Search previously indexed files and documents.",
        "code_interpreter" => "Execute Python code in an isolated sandbox and return its output.",
        _ => return Some(format!("Invoke the {tool_type} tool.")),
    };

    Some(description.to_string())
}

fn synthetic_parameters(tool_type: &str) -> Value {
    match tool_type {
        "web_search" | "file_search" => json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        }),
        "code_interpreter" => json!({
            "type": "object",
            "properties": { "code": { "type": "string" } },
            "required": ["code"]
        }),
        _ => json!({ "type": "object" }),
    }
}
