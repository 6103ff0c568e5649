//! The uniform provider contract the engine consumes.

use async_trait::async_trait;
use context::RequestContext;
use protocol::{Item, Usage};
use serde::{Deserialize, Serialize};

use crate::{
    error::LlmError,
    event::{FinishReason, ProviderStream},
    request::ProviderRequest,
};

/// What a backend supports, consulted at request time to fail early.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub streaming: bool,
    pub tool_calling: bool,
    pub vision: bool,
    pub audio: bool,
    pub reasoning: bool,
    pub max_context_window: Option<u32>,
    /// Models served by this backend; empty means unrestricted.
    pub supported_models: Vec<String>,
    /// Provider-extension item/event types this backend understands.
    pub extension_types: Vec<String>,
}

impl Capabilities {
    pub fn supports_model(&self, model: &str) -> bool {
        self.supported_models.is_empty() || self.supported_models.iter().any(|m| m == model)
    }
}

impl From<&config::ProviderCapabilitiesConfig> for Capabilities {
    fn from(config: &config::ProviderCapabilitiesConfig) -> Self {
        Self {
            streaming: config.streaming,
            tool_calling: config.tool_calling,
            vision: config.vision,
            audio: config.audio,
            reasoning: config.reasoning,
            max_context_window: config.max_context_window,
            supported_models: Vec::new(),
            extension_types: Vec::new(),
        }
    }
}

/// The non-streaming inference result, already translated into items.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Output items in model emission order.
    pub output: Vec<Item>,
    pub usage: Usage,
    pub finish_reason: FinishReason,
}

/// An available model, OpenAI-shaped for the listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub object: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub owned_by: String,
}

/// Uniform inference contract.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The configured provider name, used for `name/model` routing.
    fn name(&self) -> &str;

    /// Advertised capabilities; the engine rejects requests the backend
    /// cannot serve before dispatch.
    fn capabilities(&self) -> &Capabilities;

    /// Non-streaming inference.
    async fn complete(&self, request: ProviderRequest, ctx: &RequestContext) -> Result<ProviderResponse, LlmError>;

    /// Streaming inference. Events arrive in order through a bounded stream
    /// ending with `Done`.
    async fn stream(&self, request: ProviderRequest, ctx: &RequestContext) -> Result<ProviderStream, LlmError>;

    /// Models this backend serves.
    async fn list_models(&self) -> anyhow::Result<Vec<Model>>;
}
