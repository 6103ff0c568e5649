//! The Chat Completions adapter.
//!
//! Translates the uniform provider contract to OpenAI-compatible backends in
//! both directions, including SSE delta reassembly on the inbound streaming
//! path.

mod input;
mod output;
mod stream;
mod wire;

use async_trait::async_trait;
use context::RequestContext;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};

use crate::{
    error::{LlmError, status_error},
    event::{ProviderEvent, ProviderStream},
    http_client::http_client,
    provider::{Capabilities, Model, Provider, ProviderResponse},
    request::ProviderRequest,
    retry,
};

use self::stream::ChunkAssembler;

pub struct ChatCompletionsProvider {
    name: String,
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    capabilities: Capabilities,
    timeout: std::time::Duration,
    max_retries: u32,
}

impl ChatCompletionsProvider {
    pub fn new(name: impl Into<String>, config: &config::ProviderConfig) -> Self {
        let mut capabilities = Capabilities::from(&config.capabilities);
        capabilities.supported_models = config.models.clone();

        Self {
            name: name.into(),
            client: http_client(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            capabilities,
            timeout: config.timeout,
            max_retries: config.max_retries,
        }
    }

    async fn send(&self, wire_request: &wire::ChatCompletionRequest) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json");

        if let Some(key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()));
        }

        let body = serde_json::to_vec(wire_request)
            .map_err(|e| LlmError::InvalidRequest(format!("failed to serialize request: {e}")))?;

        let response = builder.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::ConnectionError(format!("failed to reach {}: {e}", self.name))
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            log::error!("chat completions backend {} returned {status}: {error_text}", self.name);

            return Err(status_error(status.as_u16(), error_text));
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn complete(&self, request: ProviderRequest, _ctx: &RequestContext) -> Result<ProviderResponse, LlmError> {
        let wire_request = input::to_wire(request, false);

        let response = retry::with_backoff(self.max_retries, || self.send(&wire_request)).await?;

        let response_text = response.text().await.map_err(|e| {
            log::error!("failed to read chat completions response body: {e}");
            LlmError::InternalError(None)
        })?;

        let parsed: wire::ChatCompletionResponse = serde_json::from_str(&response_text).map_err(|e| {
            log::error!("failed to parse chat completions response: {e}");
            LlmError::InternalError(None)
        })?;

        Ok(output::to_provider_response(parsed))
    }

    async fn stream(&self, request: ProviderRequest, _ctx: &RequestContext) -> Result<ProviderStream, LlmError> {
        let wire_request = input::to_wire(request, true);

        let response = retry::with_backoff(self.max_retries, || self.send(&wire_request)).await?;

        let events = response.bytes_stream().eventsource();

        let provider_events = events
            .scan(ChunkAssembler::default(), |assembler, event| {
                let out: Vec<Result<ProviderEvent, LlmError>> = match event {
                    Err(e) => {
                        log::warn!("SSE parsing error in chat completions stream: {e}");
                        vec![Err(LlmError::ConnectionError(format!("stream error: {e}")))]
                    }
                    Ok(event) if event.data == "[DONE]" => assembler.finish().into_iter().map(Ok).collect(),
                    Ok(event) => match serde_json::from_str::<wire::ChatCompletionChunk>(&event.data) {
                        Ok(chunk) => assembler.handle(chunk).into_iter().map(Ok).collect(),
                        Err(e) => {
                            log::warn!("failed to parse chat completions chunk: {e}");
                            Vec::new()
                        }
                    },
                };

                futures::future::ready(Some(futures::stream::iter(out)))
            })
            .flatten()
            .chain(futures::stream::once(futures::future::ready(Ok(ProviderEvent::Done))));

        Ok(Box::pin(provider_events))
    }

    async fn list_models(&self) -> anyhow::Result<Vec<Model>> {
        use anyhow::Context;

        let mut builder = self.client.get(format!("{}/models", self.base_url));

        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.context("failed to request models")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "<empty response>".to_string());
            anyhow::bail!("models request failed with status {status}: {body}");
        }

        let api_response: wire::ModelsResponse = response.json().await.context("failed to deserialize models")?;

        Ok(api_response
            .data
            .into_iter()
            .map(|model| Model {
                id: format!("{}/{}", self.name, model.id),
                object: "model".to_string(),
                created: model.created.unwrap_or(0),
                owned_by: model.owned_by.unwrap_or_else(|| self.name.clone()),
            })
            .collect())
    }
}
