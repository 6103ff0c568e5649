//! Near-identity forwarder for backends that speak the Responses API.
//!
//! The request is rebuilt from the uniform provider contract and passed
//! through; upstream stream events map 1:1 onto provider events, so new
//! upstream event types (reasoning streaming, code-interpreter progress)
//! need no synthesis here.

use async_trait::async_trait;
use context::RequestContext;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use protocol::{CreateResponseRequest, EventKind, Item, ResponseStatus, StreamEvent, TextConfig, Truncation};
use reqwest::{Client, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};

use crate::{
    error::{LlmError, status_error},
    event::{FinishReason, ProviderEvent, ProviderStream},
    http_client::http_client,
    provider::{Capabilities, Model, Provider, ProviderResponse},
    request::ProviderRequest,
    retry, translate,
};

pub struct ResponsesProvider {
    name: String,
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    capabilities: Capabilities,
    timeout: std::time::Duration,
    max_retries: u32,
}

impl ResponsesProvider {
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

    fn build_upstream_request(&self, request: ProviderRequest, stream: bool) -> CreateResponseRequest {
        let (instructions, input) = translate::messages_to_items(&request.messages);

        CreateResponseRequest {
            model: request.model,
            input,
            instructions,
            tools: request.tools,
            tool_choice: request.tool_choice,
            allowed_tools: None,
            temperature: request.temperature,
            top_p: request.top_p,
            max_output_tokens: request.max_output_tokens,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            top_logprobs: request.top_logprobs,
            // The gateway owns persistence; never store upstream.
            store: Some(false),
            stream: Some(stream),
            previous_response_id: None,
            truncation: Truncation::Disabled,
            text: request.response_format.map(|format| TextConfig { format: Some(format) }),
            reasoning: None,
            include: Vec::new(),
            stream_options: None,
            parallel_tool_calls: request.parallel_tool_calls,
            max_tool_calls: None,
            agent: None,
            extensions: request.extensions,
        }
    }

    async fn send(&self, body: &CreateResponseRequest) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/responses", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json");

        if let Some(key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()));
        }

        let body = serde_json::to_vec(body)
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
            log::error!("responses backend {} returned {status}: {error_text}", self.name);

            return Err(status_error(status.as_u16(), error_text));
        }

        Ok(response)
    }
}

/// Derive the uniform finish reason from a terminal upstream response.
fn finish_reason_for(status: ResponseStatus, output: &[Item]) -> FinishReason {
    if output.iter().any(|item| item.as_function_call().is_some()) {
        return FinishReason::ToolCalls;
    }

    match status {
        ResponseStatus::Incomplete => FinishReason::Length,
        ResponseStatus::Failed => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// Map one upstream stream event onto provider events, 1:1 where possible.
fn map_event(event: StreamEvent) -> Vec<ProviderEvent> {
    match event.kind {
        EventKind::OutputTextDelta { delta, .. } => vec![ProviderEvent::TextDelta { delta }],
        EventKind::OutputTextDone { text, .. } => vec![ProviderEvent::TextDone { text }],
        EventKind::RefusalDelta { delta, .. } => vec![ProviderEvent::RefusalDelta { delta }],
        EventKind::ReasoningTextDelta { delta, .. } => vec![ProviderEvent::ReasoningDelta { delta }],
        EventKind::ReasoningTextDone { text, .. } => vec![ProviderEvent::ReasoningDone { text }],
        EventKind::OutputItemAdded { output_index, item } => match item.as_function_call() {
            Some(call) => vec![ProviderEvent::ToolCallDelta {
                index: output_index,
                id: Some(call.call_id.clone()),
                name: Some(call.name.clone()),
                arguments_fragment: String::new(),
            }],
            None => Vec::new(),
        },
        EventKind::FunctionCallArgumentsDelta { output_index, delta, .. } => vec![ProviderEvent::ToolCallDelta {
            index: output_index,
            id: None,
            name: None,
            arguments_fragment: delta,
        }],
        EventKind::OutputItemDone { output_index, item } => match item.as_function_call() {
            Some(call) => vec![ProviderEvent::ToolCallDone {
                index: output_index,
                id: call.call_id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            }],
            None => Vec::new(),
        },
        EventKind::ResponseCompleted { response } | EventKind::ResponseIncomplete { response } => {
            let mut events = Vec::new();

            if let Some(usage) = response.usage {
                events.push(ProviderEvent::UsageReport { usage });
            }

            events.push(ProviderEvent::Finish {
                reason: finish_reason_for(response.status, &response.output),
            });
            events
        }
        EventKind::ResponseFailed { response } => {
            let message = response
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "upstream response failed".to_string());

            vec![ProviderEvent::Error { error: message }]
        }
        EventKind::Error { error } => vec![ProviderEvent::Error { error: error.message }],
        EventKind::Extension { event_type, data } => vec![ProviderEvent::Extension { event_type, data }],
        // Lifecycle bookkeeping the engine re-synthesizes itself.
        _ => Vec::new(),
    }
}

#[async_trait]
impl Provider for ResponsesProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn complete(&self, request: ProviderRequest, _ctx: &RequestContext) -> Result<ProviderResponse, LlmError> {
        let upstream_request = self.build_upstream_request(request, false);

        let response = retry::with_backoff(self.max_retries, || self.send(&upstream_request)).await?;

        let upstream: protocol::Response = response.json().await.map_err(|e| {
            log::error!("failed to parse upstream response: {e}");
            LlmError::InternalError(None)
        })?;

        if upstream.status == ResponseStatus::Failed {
            let message = upstream
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "upstream response failed".to_string());

            return Err(LlmError::InternalError(Some(message)));
        }

        let finish_reason = finish_reason_for(upstream.status, &upstream.output);

        Ok(ProviderResponse {
            output: upstream.output,
            usage: upstream.usage.unwrap_or_default(),
            finish_reason,
        })
    }

    async fn stream(&self, request: ProviderRequest, _ctx: &RequestContext) -> Result<ProviderStream, LlmError> {
        let upstream_request = self.build_upstream_request(request, true);

        let response = retry::with_backoff(self.max_retries, || self.send(&upstream_request)).await?;

        let events = response
            .bytes_stream()
            .eventsource()
            .flat_map(|event| {
                let out: Vec<Result<ProviderEvent, LlmError>> = match event {
                    Err(e) => {
                        log::warn!("SSE parsing error in responses stream: {e}");
                        vec![Err(LlmError::ConnectionError(format!("stream error: {e}")))]
                    }
                    Ok(event) if event.data == "[DONE]" => Vec::new(),
                    Ok(event) => match serde_json::from_str::<StreamEvent>(&event.data) {
                        Ok(parsed) => map_event(parsed).into_iter().map(Ok).collect(),
                        Err(e) => {
                            log::warn!("failed to parse upstream stream event: {e}");
                            Vec::new()
                        }
                    },
                };

                futures::stream::iter(out)
            })
            .chain(futures::stream::once(futures::future::ready(Ok(ProviderEvent::Done))));

        Ok(Box::pin(events))
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

        #[derive(serde::Deserialize)]
        struct ModelsResponse {
            #[serde(default)]
            data: Vec<Model>,
        }

        let api_response: ModelsResponse = response.json().await.context("failed to deserialize models")?;

        Ok(api_response
            .data
            .into_iter()
            .map(|mut model| {
                model.id = format!("{}/{}", self.name, model.id);
                model
            })
            .collect())
    }
}
