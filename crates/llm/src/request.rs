//! The uniform inference request the engine hands to a provider.

use protocol::{ToolChoice, ToolDefinition};
use serde_json::{Map, Value};

/// A provider-agnostic inference request.
///
/// Built once per turn from protocol items; the adapters turn it into their
/// wire format.
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    pub model: String,
    /// Ordered conversation, already flattened and role-merged.
    pub messages: Vec<ProviderMessage>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub top_logprobs: Option<u32>,
    pub parallel_tool_calls: Option<bool>,
    /// `text.format` passthrough; opaque JSON schema allowed.
    pub response_format: Option<Value>,
    /// Provider-specific extension parameters, forwarded opaquely.
    pub extensions: Map<String, Value>,
}

/// One conversation message, chat-style.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMessage {
    pub role: ProviderRole,
    pub content: ProviderContent,
    pub tool_calls: Vec<ProviderToolCall>,
    /// Set on tool-result messages to pair them with their call.
    pub tool_call_id: Option<String>,
    /// Reasoning text for backends that advertise reasoning support.
    pub reasoning_content: Option<String>,
}

impl ProviderMessage {
    pub fn text(role: ProviderRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: ProviderContent::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            reasoning_content: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            role: ProviderRole::Tool,
            content: ProviderContent::Text(output.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
            reasoning_content: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Message content: plain text or multi-modal parts.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderContent {
    Text(String),
    Parts(Vec<ProviderPart>),
}

impl ProviderContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ProviderContent::Text(text) => Some(text),
            ProviderContent::Parts(_) => None,
        }
    }
}

/// One multi-modal content part.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderPart {
    Text { text: String },
    /// Remote URL or `data:` URI (inline images are encoded as data URIs for
    /// backends that expect them).
    ImageUrl { url: String },
    Audio { data: String, format: String },
}

/// A tool call attached to an assistant message.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument string, opaque here.
    pub arguments: String,
}
