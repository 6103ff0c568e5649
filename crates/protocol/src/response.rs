//! The server-produced response artifact and its lifecycle.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    Error, Item, Result,
    request::{CreateResponseRequest, ReasoningConfig, TextConfig, ToolChoice, ToolDefinition, Truncation},
};

/// Response lifecycle.
///
/// `queued → in_progress → {completed | incomplete | failed | cancelled |
/// requires_action}`; every status on the right is terminal for the current
/// turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Queued,
    InProgress,
    Completed,
    Incomplete,
    Failed,
    Cancelled,
    RequiresAction,
}

impl ResponseStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ResponseStatus::Queued | ResponseStatus::InProgress)
    }

    /// Whether `self → to` is in the allowed transition set.
    pub fn can_transition_to(self, to: ResponseStatus) -> bool {
        match self {
            ResponseStatus::Queued => matches!(to, ResponseStatus::InProgress),
            ResponseStatus::InProgress => matches!(
                to,
                ResponseStatus::Completed
                    | ResponseStatus::Incomplete
                    | ResponseStatus::Failed
                    | ResponseStatus::Cancelled
                    | ResponseStatus::RequiresAction
            ),
            _ => false,
        }
    }
}

/// Token accounting with cached/reasoning breakdowns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    #[serde(default)]
    pub input_tokens_details: InputTokensDetails,
    #[serde(default)]
    pub output_tokens_details: OutputTokensDetails,
}

impl Usage {
    /// Accumulate another turn's usage into this one.
    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        self.input_tokens_details.cached_tokens += other.input_tokens_details.cached_tokens;
        self.output_tokens_details.reasoning_tokens += other.output_tokens_details.reasoning_tokens;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputTokensDetails {
    pub cached_tokens: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTokensDetails {
    pub reasoning_tokens: u64,
}

/// Why a response finished `incomplete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncompleteDetails {
    pub reason: String,
}

/// The persisted and wire-visible response object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    /// Always `"response"`.
    #[serde(default = "default_object")]
    pub object: String,
    /// Unix seconds.
    pub created_at: u64,
    pub status: ResponseStatus,
    #[serde(default)]
    pub output: Vec<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete_details: Option<IncompleteDetails>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub truncation: Truncation,
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
    pub text: Option<TextConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,
    #[serde(default = "default_true")]
    pub parallel_tool_calls: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_calls: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(default = "default_true")]
    pub store: bool,
    /// Tenant isolation key. Internal: never serialized to the wire; the
    /// storage adapters persist it out-of-band.
    #[serde(skip)]
    pub tenant: Option<String>,
    /// Provider extension blobs, echoed opaquely.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl Response {
    /// A fresh `queued` response echoing the request's parameters.
    pub fn from_request(request: &CreateResponseRequest, tenant: Option<String>) -> Self {
        Self {
            id: crate::id::response_id(),
            object: "response".to_string(),
            created_at: unix_now(),
            status: ResponseStatus::Queued,
            output: Vec::new(),
            error: None,
            incomplete_details: None,
            model: request.model.clone(),
            instructions: request.instructions.clone(),
            tools: request.tools.clone(),
            tool_choice: request.tool_choice.clone(),
            truncation: request.truncation,
            temperature: request.temperature,
            top_p: request.top_p,
            max_output_tokens: request.max_output_tokens,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            text: request.text.clone(),
            reasoning: request.reasoning.clone(),
            parallel_tool_calls: request.parallel_tool_calls(),
            max_tool_calls: request.max_tool_calls,
            usage: None,
            previous_response_id: request.previous_response_id.clone(),
            store: request.store(),
            tenant,
            extensions: request.extensions.clone(),
        }
    }

    /// Move to `to`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, to: ResponseStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::server_error(format!(
                "response {} cannot transition from {:?} to {to:?}",
                self.id, self.status
            )));
        }

        self.status = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

fn default_object() -> String {
    "response".to_string()
}

fn default_true() -> bool {
    true
}

/// Current time as Unix seconds.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
