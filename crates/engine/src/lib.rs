//! The agentic loop engine.
//!
//! Composes provider inference with pluggable tool executors in a bounded
//! multi-turn cycle: infer, detect tool calls, execute server-side tools,
//! feed results back, infer again. The loop terminates on a final message
//! (`completed`), a client-executed function call (`requires_action`),
//! cancellation, a fatal provider error (`failed`), or the turn bound
//! (`incomplete`).

mod dispatch;
mod emitter;
mod turn;

use std::{collections::BTreeMap, sync::Arc};

use context::RequestContext;
use futures::stream::BoxStream;
use llm::{FinishReason, Provider, ProviderRegistry, ProviderRequest};
use protocol::{
    CreateResponseRequest, Error, EventKind, IncompleteDetails, InputContent, Item, MessageContent, Response,
    ResponseStatus, ToolChoice, ToolChoiceMode, ToolPhase, Truncation, Usage,
};
use storage::{ResponseRecord, ResponseStore};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tools::ExecutorRegistry;

use crate::{
    dispatch::{EmittedCall, activity_phase, execute_calls, plan_dispatch},
    emitter::{ClientGone, Emitter},
    turn::{TurnError, run_turn},
};

/// The engine's streaming output: sequence-numbered protocol events ending
/// with a terminal lifecycle event. The transport appends the `[DONE]`
/// sentinel.
pub type EventStream = BoxStream<'static, protocol::StreamEvent>;

/// How the loop ended.
enum Finalization {
    Completed,
    Incomplete(&'static str),
    RequiresAction,
    Failed(Error),
    Cancelled,
}

/// The agentic loop engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    registry: ProviderRegistry,
    executors: ExecutorRegistry,
    store: Option<Arc<dyn ResponseStore>>,
    config: config::EngineConfig,
    agents: BTreeMap<String, config::AgentProfile>,
}

/// A validated request with everything resolved for the loop.
struct Prepared {
    request: CreateResponseRequest,
    provider: Arc<dyn Provider>,
    backend_model: String,
    chain: Vec<Item>,
    max_turns: u32,
}

impl Engine {
    pub fn new(
        registry: ProviderRegistry,
        executors: ExecutorRegistry,
        store: Option<Arc<dyn ResponseStore>>,
        config: config::EngineConfig,
        agents: BTreeMap<String, config::AgentProfile>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                executors,
                store,
                config,
                agents,
            }),
        }
    }

    /// Build the engine from configuration.
    pub fn from_config(config: &config::Config, store: Option<Arc<dyn ResponseStore>>) -> Self {
        Self::new(
            ProviderRegistry::from_config(&config.llm),
            ExecutorRegistry::from_config(&config.tools),
            store,
            config.engine.clone(),
            config.agents.clone(),
        )
    }

    /// Aggregated model listing across all providers.
    pub async fn list_models(&self) -> Vec<llm::Model> {
        self.inner.registry.list_models().await
    }

    /// The configured store, shared with the transport's CRUD handlers.
    pub fn store(&self) -> Option<Arc<dyn ResponseStore>> {
        self.inner.store.clone()
    }

    /// Non-streaming entry: drive the loop to a terminal response.
    pub async fn run(
        &self,
        request: CreateResponseRequest,
        ctx: &RequestContext,
        cancel: CancellationToken,
    ) -> Result<Response, Error> {
        let prepared = self.inner.prepare(request, ctx).await?;
        let mut emitter = Emitter::disabled();

        self.inner.execute(prepared, ctx.clone(), cancel, &mut emitter).await
    }

    /// Streaming entry: validation and chain hydration happen before the
    /// stream opens (failures map to plain HTTP errors); everything after
    /// flows as events.
    pub async fn stream(
        &self,
        request: CreateResponseRequest,
        ctx: &RequestContext,
        cancel: CancellationToken,
    ) -> Result<EventStream, Error> {
        let prepared = self.inner.prepare(request, ctx).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(self.inner.config.event_buffer);
        let inner = self.inner.clone();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let mut emitter = Emitter::channel(tx);

            if let Err(err) = inner.execute(prepared, ctx, cancel, &mut emitter).await {
                // Terminal lifecycle events are emitted inside; anything
                // surfacing here failed outside the response lifecycle.
                let _ = emitter.emit(EventKind::Error { error: err }).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

impl Inner {
    async fn prepare(&self, request: CreateResponseRequest, ctx: &RequestContext) -> Result<Prepared, Error> {
        request.validate()?;

        let (request, max_turns) = self.apply_agent_profile(request)?;

        let (provider, backend_model) = self.registry.resolve(&request.model)?;

        check_capabilities(&request, provider.as_ref())?;

        if request.store() && self.store.is_none() {
            return Err(Error::invalid_request(
                "store",
                "storage is not configured; set store=false",
            ));
        }

        let chain = match request.previous_response_id.as_deref() {
            Some(previous) => {
                let store = self
                    .store
                    .as_ref()
                    .ok_or_else(|| Error::invalid_request("previous_response_id", "storage is not configured"))?;

                store.build_context(ctx, previous).await.map_err(|err| {
                    log::debug!("chain reconstruction for {previous} failed: {err}");
                    Error::invalid_request("previous_response_id", format!("cannot resolve `{previous}`: {err}"))
                })?
            }
            None => Vec::new(),
        };

        Ok(Prepared {
            request,
            provider,
            backend_model,
            chain,
            max_turns,
        })
    }

    fn apply_agent_profile(
        &self,
        mut request: CreateResponseRequest,
    ) -> Result<(CreateResponseRequest, u32), Error> {
        let Some(agent) = request.agent.clone() else {
            return Ok((request, self.config.max_turns));
        };

        let Some(profile) = self.agents.get(&agent) else {
            return Err(Error::invalid_request(
                "agent",
                format!("unknown agent profile `{agent}`"),
            ));
        };

        if request.instructions.is_none() {
            request.instructions = profile.instructions.clone();
        }

        // The profile name may be used as a model alias.
        if request.model == agent
            && let Some(model) = &profile.model
        {
            request.model = model.clone();
        }

        Ok((request, profile.max_turns.unwrap_or(self.config.max_turns)))
    }

    async fn execute(
        &self,
        prepared: Prepared,
        ctx: RequestContext,
        cancel: CancellationToken,
        emitter: &mut Emitter,
    ) -> Result<Response, Error> {
        let mut response = Response::from_request(&prepared.request, ctx.tenant().map(str::to_string));
        let mut usage = Usage::default();

        let outcome = match self
            .drive(&prepared, &ctx, &cancel, emitter, &mut response, &mut usage)
            .await
        {
            Ok(outcome) => outcome,
            // The client went away mid-stream; the turn context is gone.
            Err(ClientGone) => Finalization::Cancelled,
        };

        response.usage = Some(usage);

        let final_event = match outcome {
            Finalization::Completed => {
                response.transition(ResponseStatus::Completed)?;
                Some(EventKind::ResponseCompleted {
                    response: response.clone(),
                })
            }
            Finalization::Incomplete(reason) => {
                response.transition(ResponseStatus::Incomplete)?;
                response.incomplete_details = Some(IncompleteDetails {
                    reason: reason.to_string(),
                });
                Some(EventKind::ResponseIncomplete {
                    response: response.clone(),
                })
            }
            Finalization::RequiresAction => {
                response.transition(ResponseStatus::RequiresAction)?;
                // Terminal for this turn; the stream closes with the
                // snapshot carrying the pause status.
                Some(EventKind::ResponseCompleted {
                    response: response.clone(),
                })
            }
            Finalization::Failed(err) => {
                response.transition(ResponseStatus::Failed)?;
                response.error = Some(err);
                Some(EventKind::ResponseFailed {
                    response: response.clone(),
                })
            }
            Finalization::Cancelled => {
                response.transition(ResponseStatus::Cancelled)?;
                None
            }
        };

        // Persist before announcing the terminal state; a cancelled run is
        // abandoned rather than stored.
        if prepared.request.store()
            && !matches!(response.status, ResponseStatus::Cancelled)
            && let Some(store) = &self.store
        {
            let record = ResponseRecord::new(response.clone(), prepared.request.input.clone());

            if let Err(err) = store.save_response(&ctx, record).await {
                log::error!("failed to persist response {}: {err}", response.id);
                return Err(err.into());
            }
        }

        if let Some(event) = final_event {
            let _ = emitter.emit(event).await;
        }

        Ok(response)
    }

    /// The per-turn loop proper. Returns how to finalize; `Err(ClientGone)`
    /// means the stream consumer vanished.
    async fn drive(
        &self,
        prepared: &Prepared,
        ctx: &RequestContext,
        cancel: &CancellationToken,
        emitter: &mut Emitter,
        response: &mut Response,
        usage: &mut Usage,
    ) -> Result<Finalization, ClientGone> {
        let request = &prepared.request;

        emitter
            .emit(EventKind::ResponseCreated {
                response: response.clone(),
            })
            .await?;

        if response.transition(ResponseStatus::InProgress).is_err() {
            return Ok(Finalization::Failed(Error::server_error("response state corrupted")));
        }

        emitter
            .emit(EventKind::ResponseInProgress {
                response: response.clone(),
            })
            .await?;

        let mut conversation: Vec<Item> = prepared.chain.clone();
        conversation.extend(request.input.iter().cloned());

        let mut executed_calls: u32 = 0;
        let mut turn: u32 = 0;
        let mut tool_calls_seen = false;

        loop {
            if turn >= prepared.max_turns {
                log::debug!("response {} hit the turn bound of {}", response.id, prepared.max_turns);
                return Ok(Finalization::Incomplete("max_tool_calls"));
            }

            if request.truncation == Truncation::Auto
                && let Some(window) = prepared.provider.capabilities().max_context_window
            {
                let dropped = truncate_conversation(&mut conversation, window);

                if dropped > 0 {
                    log::debug!("truncated {dropped} oldest items from the conversation of {}", response.id);
                }
            }

            let provider_request = build_provider_request(prepared, &conversation, tool_calls_seen);

            let turn_result = match run_turn(
                &prepared.provider,
                provider_request,
                ctx,
                emitter,
                response.output.len(),
                self.config.provider_timeout,
                cancel,
            )
            .await
            {
                Ok(result) => result,
                Err(TurnError::Cancelled) => return Ok(Finalization::Cancelled),
                Err(TurnError::ClientGone) => return Err(ClientGone),
                Err(TurnError::Provider(err)) => return Ok(Finalization::Failed(err)),
            };

            usage.add(turn_result.usage);

            let base_index = response.output.len();
            let mut calls = Vec::new();

            for (offset, item) in turn_result.items.iter().enumerate() {
                if let Some(payload) = item.as_function_call() {
                    calls.push(EmittedCall {
                        item_id: item.id.clone(),
                        output_index: base_index + offset,
                        payload: payload.clone(),
                    });
                }
            }

            response.output.extend(turn_result.items.iter().cloned());
            conversation.extend(turn_result.items);

            if calls.is_empty() {
                // A required tool choice with a message-only turn loops back
                // for another attempt, bounded by max_turns.
                if !tool_calls_seen && requires_tool_call(request.tool_choice.as_ref()) {
                    log::debug!("tool_choice requires a call but none was produced; re-running the turn");
                    turn += 1;
                    continue;
                }

                return Ok(match turn_result.finish {
                    FinishReason::Length => Finalization::Incomplete("max_output_tokens"),
                    FinishReason::ContentFilter => {
                        Finalization::Failed(Error::model_error("the backend filtered the response content"))
                    }
                    _ => Finalization::Completed,
                });
            }

            let tool_choice = if tool_calls_seen { None } else { request.tool_choice.as_ref() };
            tool_calls_seen = true;

            let plan = plan_dispatch(
                calls,
                &request.tools,
                request.allowed_tools.as_deref(),
                tool_choice,
                &self.executors,
            );

            for item in &plan.rejected {
                self.append_output_item(emitter, response, &mut conversation, item.clone()).await?;
            }

            if plan.delegate {
                return Ok(Finalization::RequiresAction);
            }

            if let Some(max) = request.max_tool_calls
                && executed_calls + plan.pending.len() as u32 > max
            {
                log::debug!("response {} exceeded max_tool_calls of {max}", response.id);
                return Ok(Finalization::Incomplete("max_tool_calls"));
            }

            for pending in &plan.pending {
                emitter
                    .emit(EventKind::ToolCall {
                        tool: pending.tool_type.clone(),
                        phase: ToolPhase::InProgress,
                        item_id: pending.item_id.clone(),
                        output_index: pending.output_index,
                    })
                    .await?;

                if let Some(phase) = activity_phase(&pending.tool_type) {
                    emitter
                        .emit(EventKind::ToolCall {
                            tool: pending.tool_type.clone(),
                            phase,
                            item_id: pending.item_id.clone(),
                            output_index: pending.output_index,
                        })
                        .await?;
                }
            }

            let results = execute_calls(
                &plan.pending,
                ctx,
                request.parallel_tool_calls(),
                self.config.tool_timeout,
                cancel,
            )
            .await;

            executed_calls += plan.pending.len() as u32;

            // Result items follow the model's call order, whatever the
            // completion order was.
            for (pending, result) in plan.pending.iter().zip(results) {
                let (phase, output) = match result {
                    Ok(output) => (ToolPhase::Completed, output),
                    Err(error) => (ToolPhase::Failed, error),
                };

                emitter
                    .emit(EventKind::ToolCall {
                        tool: pending.tool_type.clone(),
                        phase,
                        item_id: pending.item_id.clone(),
                        output_index: pending.output_index,
                    })
                    .await?;

                let item = Item::function_call_output(&pending.call.call_id, output);
                self.append_output_item(emitter, response, &mut conversation, item).await?;
            }

            if cancel.is_cancelled() {
                return Ok(Finalization::Cancelled);
            }

            turn += 1;
        }
    }

    async fn append_output_item(
        &self,
        emitter: &mut Emitter,
        response: &mut Response,
        conversation: &mut Vec<Item>,
        item: Item,
    ) -> Result<(), ClientGone> {
        let output_index = response.output.len();

        emitter
            .emit(EventKind::OutputItemAdded {
                output_index,
                item: item.clone(),
            })
            .await?;

        emitter
            .emit(EventKind::OutputItemDone {
                output_index,
                item: item.clone(),
            })
            .await?;

        conversation.push(item.clone());
        response.output.push(item);

        Ok(())
    }
}

fn build_provider_request(prepared: &Prepared, conversation: &[Item], tool_calls_seen: bool) -> ProviderRequest {
    let request = &prepared.request;
    let reasoning = prepared.provider.capabilities().reasoning;

    ProviderRequest {
        model: prepared.backend_model.clone(),
        messages: llm::translate::items_to_messages(conversation, request.instructions.as_deref(), reasoning),
        tools: request.tools.clone(),
        // The tool-choice constraint binds until the model has actually
        // called a tool; later turns are permissive so tool results can
        // become a final message.
        tool_choice: if tool_calls_seen { None } else { request.tool_choice.clone() },
        temperature: request.temperature,
        top_p: request.top_p,
        max_output_tokens: request.max_output_tokens,
        frequency_penalty: request.frequency_penalty,
        presence_penalty: request.presence_penalty,
        top_logprobs: request.top_logprobs,
        parallel_tool_calls: request.parallel_tool_calls,
        response_format: request.text.as_ref().and_then(|text| text.format.clone()),
        extensions: request.extensions.clone(),
    }
}

fn requires_tool_call(tool_choice: Option<&ToolChoice>) -> bool {
    matches!(
        tool_choice,
        Some(ToolChoice::Mode(ToolChoiceMode::Required)) | Some(ToolChoice::Function { .. })
    )
}

/// Rough token estimate for budget checks: four characters per token over
/// the serialized item.
fn estimate_tokens(item: &Item) -> u32 {
    let serialized = serde_json::to_string(item).map(|s| s.len()).unwrap_or(0);
    (serialized / 4).max(1) as u32
}

/// `truncation: auto`: drop the oldest items until the conversation fits the
/// backend's context window (with headroom for the reply). The most recent
/// item always survives. Returns how many items were dropped.
fn truncate_conversation(conversation: &mut Vec<Item>, max_context_window: u32) -> usize {
    let budget = max_context_window.saturating_mul(3) / 4;
    let mut total: u32 = conversation.iter().map(estimate_tokens).sum();

    let mut dropped = 0;

    while total > budget && conversation.len() > 1 {
        let removed = conversation.remove(0);
        total = total.saturating_sub(estimate_tokens(&removed));
        dropped += 1;
    }

    dropped
}

fn check_capabilities(request: &CreateResponseRequest, provider: &dyn Provider) -> Result<(), Error> {
    let capabilities = provider.capabilities();

    if request.stream() && !capabilities.streaming {
        return Err(Error::invalid_request(
            "stream",
            format!("provider `{}` does not support streaming", provider.name()),
        ));
    }

    if !request.tools.is_empty() && !capabilities.tool_calling {
        return Err(Error::invalid_request(
            "tools",
            format!("provider `{}` does not support tool calling", provider.name()),
        ));
    }

    let mut has_image = false;
    let mut has_audio = false;

    for item in &request.input {
        if let Some(message) = item.as_message()
            && let MessageContent::Input(parts) = &message.content
        {
            for part in parts {
                match part {
                    InputContent::InputImage { .. } => has_image = true,
                    InputContent::InputAudio { .. } => has_audio = true,
                    _ => {}
                }
            }
        }
    }

    if has_image && !capabilities.vision {
        return Err(Error::invalid_request(
            "input",
            format!("provider `{}` does not support image input", provider.name()),
        ));
    }

    if has_audio && !capabilities.audio {
        return Err(Error::invalid_request(
            "input",
            format!("provider `{}` does not support audio input", provider.name()),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_tool_call_matches_constraining_choices() {
        assert!(requires_tool_call(Some(&ToolChoice::Mode(ToolChoiceMode::Required))));
        assert!(requires_tool_call(Some(&ToolChoice::forced("lookup"))));
        assert!(!requires_tool_call(Some(&ToolChoice::Mode(ToolChoiceMode::Auto))));
        assert!(!requires_tool_call(Some(&ToolChoice::Mode(ToolChoiceMode::None))));
        assert!(!requires_tool_call(None));
    }

    #[test]
    fn truncation_drops_oldest_items_first() {
        let mut conversation: Vec<Item> = (0..10).map(|i| Item::user_text(format!("message {i} {}", "x".repeat(200)))).collect();
        let keep_last = conversation.last().cloned().unwrap();

        let dropped = truncate_conversation(&mut conversation, 100);

        assert!(dropped > 0);
        assert!(!conversation.is_empty());
        assert_eq!(conversation.last(), Some(&keep_last));
    }

    #[test]
    fn truncation_is_a_no_op_within_budget() {
        let mut conversation = vec![Item::user_text("short")];
        assert_eq!(truncate_conversation(&mut conversation, 100_000), 0);
        assert_eq!(conversation.len(), 1);
    }
}
