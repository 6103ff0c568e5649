//! Provider abstraction and wire adapters for inference backends.
//!
//! The engine speaks one uniform contract ([`Provider`]): a request built
//! from protocol items, a non-streaming [`ProviderResponse`] of output items,
//! and a streaming sequence of [`ProviderEvent`]s. Two adapters implement it:
//! the Chat Completions adapter translating in both directions (including
//! SSE delta reassembly), and a near-identity forwarder for backends that
//! already speak the Responses API.

mod chat;
mod error;
mod event;
mod http_client;
mod provider;
mod registry;
mod request;
mod responses;
mod retry;
pub mod translate;

pub use chat::ChatCompletionsProvider;
pub use error::{LlmError, Result};
pub use event::{FinishReason, ProviderEvent, ProviderStream};
pub use provider::{Capabilities, Model, Provider, ProviderResponse};
pub use registry::ProviderRegistry;
pub use request::{ProviderContent, ProviderMessage, ProviderPart, ProviderRequest, ProviderRole, ProviderToolCall};
pub use responses::ResponsesProvider;
