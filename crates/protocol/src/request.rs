//! The client-facing create-response request and its validation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Item, Result, id};

/// How a tool executes, derived from the definition's `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// Client-executed: the loop pauses with `requires_action`.
    Function,
    /// Server-side call to an external MCP server.
    Mcp,
    /// Server-side in-process provider (web search, file search).
    Builtin,
    /// Server-side execution in an isolated sandbox pod.
    Sandbox,
}

/// A tool made available to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON-Schema for the arguments, opaque to the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    /// Server-specific extras (MCP server labels, search filters).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolDefinition {
    pub fn function(name: impl Into<String>, description: Option<String>, parameters: Option<Value>) -> Self {
        Self {
            tool_type: "function".to_string(),
            name: Some(name.into()),
            description,
            parameters,
            strict: None,
            extra: Map::new(),
        }
    }

    /// The name the model calls this tool by. Built-in tools are addressed by
    /// their type when no explicit name is given.
    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.tool_type)
    }

    /// Executor dispatch class for this definition.
    pub fn kind(&self) -> ToolKind {
        match self.tool_type.as_str() {
            "function" => ToolKind::Function,
            "mcp" => ToolKind::Mcp,
            "code_interpreter" => ToolKind::Sandbox,
            // web_search, file_search and provider-prefixed tools run
            // server-side in-process.
            _ => ToolKind::Builtin,
        }
    }
}

/// Tool usage policy: a mode string or a forced function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(ToolChoiceMode),
    Function {
        #[serde(rename = "type")]
        choice_type: ForcedFunctionType,
        name: String,
    },
}

impl Default for ToolChoice {
    fn default() -> Self {
        ToolChoice::Mode(ToolChoiceMode::Auto)
    }
}

impl ToolChoice {
    pub fn forced(name: impl Into<String>) -> Self {
        ToolChoice::Function {
            choice_type: ForcedFunctionType::Function,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoiceMode {
    Auto,
    Required,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedFunctionType {
    Function,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    Auto,
    #[default]
    Disabled,
}

/// Structured-output configuration, passed through to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_usage: Option<bool>,
}

/// The body of `POST /v1/responses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponseRequest {
    pub model: String,
    #[serde(deserialize_with = "deserialize_input")]
    pub input: Vec<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Allowlist of tool names the model may actually invoke. All tools are
    /// still advertised to the backend; violations are post-filtered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u32>,
    /// Tri-state: absent means `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(default)]
    pub truncation: Truncation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_calls: Option<u32>,
    /// Named agent profile to apply server-side defaults from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Provider extension blobs, forwarded opaquely.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl CreateResponseRequest {
    /// A minimal request with a single user text item, for tests and tools.
    pub fn user_text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input: vec![Item::user_text(text)],
            instructions: None,
            tools: Vec::new(),
            tool_choice: None,
            allowed_tools: None,
            temperature: None,
            top_p: None,
            max_output_tokens: None,
            frequency_penalty: None,
            presence_penalty: None,
            top_logprobs: None,
            store: None,
            stream: None,
            previous_response_id: None,
            truncation: Truncation::default(),
            text: None,
            reasoning: None,
            include: Vec::new(),
            stream_options: None,
            parallel_tool_calls: None,
            max_tool_calls: None,
            agent: None,
            extensions: Map::new(),
        }
    }

    pub fn store(&self) -> bool {
        self.store.unwrap_or(true)
    }

    pub fn stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    pub fn parallel_tool_calls(&self) -> bool {
        self.parallel_tool_calls.unwrap_or(true)
    }

    /// Enforce the request invariants. Failures carry the offending
    /// parameter name.
    pub fn validate(&self) -> Result<()> {
        if self.model.is_empty() {
            return Err(Error::invalid_request("model", "model must not be empty"));
        }

        if self.input.is_empty() {
            return Err(Error::invalid_request("input", "input must not be empty"));
        }

        if !self.store()
            && let Some(prev) = &self.previous_response_id
            && !prev.is_empty()
        {
            return Err(Error::invalid_request(
                "previous_response_id",
                "previous_response_id requires store=true",
            ));
        }

        if let Some(prev) = &self.previous_response_id
            && !id::is_valid_response_id(prev)
        {
            return Err(Error::invalid_request(
                "previous_response_id",
                format!("`{prev}` is not a valid response id"),
            ));
        }

        if let Some(ToolChoice::Function { name, .. }) = &self.tool_choice
            && !self.tools.iter().any(|tool| tool.effective_name() == name)
        {
            return Err(Error::invalid_request(
                "tool_choice",
                format!("tool_choice names `{name}` but no such tool was supplied"),
            ));
        }

        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(Error::invalid_request("temperature", "temperature must be in [0, 2]"));
        }

        if let Some(p) = self.top_p
            && !(0.0..=1.0).contains(&p)
        {
            return Err(Error::invalid_request("top_p", "top_p must be in [0, 1]"));
        }

        if let Some(max) = self.max_output_tokens
            && max == 0
        {
            return Err(Error::invalid_request(
                "max_output_tokens",
                "max_output_tokens must be greater than zero",
            ));
        }

        if let Some(penalty) = self.frequency_penalty
            && !(-2.0..=2.0).contains(&penalty)
        {
            return Err(Error::invalid_request(
                "frequency_penalty",
                "frequency_penalty must be in [-2, 2]",
            ));
        }

        if let Some(penalty) = self.presence_penalty
            && !(-2.0..=2.0).contains(&penalty)
        {
            return Err(Error::invalid_request(
                "presence_penalty",
                "presence_penalty must be in [-2, 2]",
            ));
        }

        if let Some(max) = self.max_tool_calls
            && max == 0
        {
            return Err(Error::invalid_request(
                "max_tool_calls",
                "max_tool_calls must be greater than zero",
            ));
        }

        Ok(())
    }
}

/// Accepts either an item array or a bare string (expanded to a single user
/// text message).
fn deserialize_input<'de, D>(deserializer: D) -> std::result::Result<Vec<Item>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum InputWire {
        Text(String),
        Items(Vec<Item>),
    }

    match InputWire::deserialize(deserializer)? {
        InputWire::Text(text) => Ok(vec![Item::user_text(text)]),
        InputWire::Items(items) => Ok(items),
    }
}
