//! One inference turn against a provider.
//!
//! The streaming path consumes provider events and synthesizes the item and
//! content-part lifecycle events of the output protocol while assembling the
//! same item list the non-streaming path gets directly. Both paths end in a
//! [`TurnResult`] the loop classifies.

use std::{collections::HashMap, sync::Arc, time::Duration};

use context::RequestContext;
use futures::StreamExt;
use llm::{FinishReason, Provider, ProviderEvent, ProviderRequest};
use protocol::{
    EventKind, Item, ItemPayload, ItemStatus, MessageContent, OutputContent, Role, Usage,
};
use tokio_util::sync::CancellationToken;

use crate::emitter::{ClientGone, Emitter};

pub(crate) struct TurnResult {
    /// Output items in model emission order.
    pub items: Vec<Item>,
    pub usage: Usage,
    pub finish: FinishReason,
}

pub(crate) enum TurnError {
    Provider(protocol::Error),
    Cancelled,
    ClientGone,
}

impl From<ClientGone> for TurnError {
    fn from(_: ClientGone) -> Self {
        TurnError::ClientGone
    }
}

pub(crate) async fn run_turn(
    provider: &Arc<dyn Provider>,
    request: ProviderRequest,
    ctx: &RequestContext,
    emitter: &mut Emitter,
    output_offset: usize,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<TurnResult, TurnError> {
    if emitter.is_streaming() {
        run_streaming_turn(provider, request, ctx, emitter, output_offset, timeout, cancel).await
    } else {
        run_blocking_turn(provider, request, ctx, timeout, cancel).await
    }
}

async fn run_blocking_turn(
    provider: &Arc<dyn Provider>,
    request: ProviderRequest,
    ctx: &RequestContext,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<TurnResult, TurnError> {
    let call = tokio::time::timeout(timeout, provider.complete(request, ctx));

    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(TurnError::Cancelled),
        result = call => match result {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(TurnError::Provider(err.into())),
            Err(_) => return Err(TurnError::Provider(protocol::Error::model_error("provider call timed out"))),
        },
    };

    Ok(TurnResult {
        items: response.output,
        usage: response.usage,
        finish: response.finish_reason,
    })
}

/// Item slots opened during a streaming turn, in emission order.
struct StreamState {
    slots: Vec<Item>,
    output_offset: usize,
    /// Open assistant message slot, with its accumulated text or refusal.
    message: Option<OpenMessage>,
    /// Open reasoning slot and its accumulated text.
    reasoning: Option<(usize, String)>,
    /// Provider tool index → slot position.
    tool_slots: HashMap<usize, usize>,
    usage: Usage,
    finish: Option<FinishReason>,
}

struct OpenMessage {
    slot: usize,
    text: String,
    refusal: String,
}

impl StreamState {
    fn new(output_offset: usize) -> Self {
        Self {
            slots: Vec::new(),
            output_offset,
            message: None,
            reasoning: None,
            tool_slots: HashMap::new(),
            usage: Usage::default(),
            finish: None,
        }
    }

    fn index_of(&self, slot: usize) -> usize {
        self.output_offset + slot
    }

    async fn open_message(&mut self, emitter: &mut Emitter) -> Result<usize, ClientGone> {
        if let Some(open) = &self.message {
            return Ok(open.slot);
        }

        let item = Item::message(Role::Assistant, MessageContent::Output(Vec::new()), ItemStatus::InProgress);
        let slot = self.slots.len();
        let output_index = self.index_of(slot);

        emitter
            .emit(EventKind::OutputItemAdded {
                output_index,
                item: item.clone(),
            })
            .await?;

        emitter
            .emit(EventKind::ContentPartAdded {
                item_id: item.id.clone(),
                output_index,
                content_index: 0,
                part: OutputContent::text(""),
            })
            .await?;

        self.slots.push(item);
        self.message = Some(OpenMessage {
            slot,
            text: String::new(),
            refusal: String::new(),
        });

        Ok(slot)
    }

    async fn close_message(&mut self, emitter: &mut Emitter) -> Result<(), ClientGone> {
        let Some(open) = self.message.take() else {
            return Ok(());
        };

        let output_index = self.index_of(open.slot);
        let item_id = self.slots[open.slot].id.clone();

        let part = if open.refusal.is_empty() {
            emitter
                .emit(EventKind::OutputTextDone {
                    item_id: item_id.clone(),
                    output_index,
                    content_index: 0,
                    text: open.text.clone(),
                })
                .await?;

            OutputContent::text(open.text)
        } else {
            emitter
                .emit(EventKind::RefusalDone {
                    item_id: item_id.clone(),
                    output_index,
                    content_index: 0,
                    refusal: open.refusal.clone(),
                })
                .await?;

            OutputContent::Refusal { refusal: open.refusal }
        };

        emitter
            .emit(EventKind::ContentPartDone {
                item_id: item_id.clone(),
                output_index,
                content_index: 0,
                part: part.clone(),
            })
            .await?;

        let item = &mut self.slots[open.slot];
        item.payload = ItemPayload::Message(protocol::MessagePayload {
            role: Role::Assistant,
            content: MessageContent::Output(vec![part]),
        });
        item.status = ItemStatus::Completed;

        emitter
            .emit(EventKind::OutputItemDone {
                output_index,
                item: item.clone(),
            })
            .await?;

        Ok(())
    }

    async fn open_tool_call(
        &mut self,
        emitter: &mut Emitter,
        index: usize,
        id: Option<String>,
        name: Option<String>,
    ) -> Result<usize, ClientGone> {
        if let Some(slot) = self.tool_slots.get(&index) {
            return Ok(*slot);
        }

        let call_id = id.unwrap_or_else(|| format!("call_{index}"));
        let item = Item::function_call(name.unwrap_or_default(), call_id, "", ItemStatus::InProgress);
        let slot = self.slots.len();

        emitter
            .emit(EventKind::OutputItemAdded {
                output_index: self.index_of(slot),
                item: item.clone(),
            })
            .await?;

        self.slots.push(item);
        self.tool_slots.insert(index, slot);

        Ok(slot)
    }

    async fn open_reasoning(&mut self, emitter: &mut Emitter) -> Result<usize, ClientGone> {
        if let Some((slot, _)) = &self.reasoning {
            return Ok(*slot);
        }

        let item = Item::new(
            ItemPayload::Reasoning(protocol::ReasoningPayload::default()),
            ItemStatus::InProgress,
        );
        let slot = self.slots.len();

        emitter
            .emit(EventKind::OutputItemAdded {
                output_index: self.index_of(slot),
                item: item.clone(),
            })
            .await?;

        self.slots.push(item);
        self.reasoning = Some((slot, String::new()));

        Ok(slot)
    }

    async fn close_reasoning(&mut self, emitter: &mut Emitter, text: Option<String>) -> Result<(), ClientGone> {
        let Some((slot, buffered)) = self.reasoning.take() else {
            return Ok(());
        };

        let text = text.unwrap_or(buffered);
        let output_index = self.index_of(slot);
        let item = &mut self.slots[slot];

        emitter
            .emit(EventKind::ReasoningTextDone {
                item_id: item.id.clone(),
                output_index,
                text: text.clone(),
            })
            .await?;

        item.payload = ItemPayload::Reasoning(protocol::ReasoningPayload {
            content: Some(text),
            ..Default::default()
        });
        item.status = ItemStatus::Completed;

        emitter
            .emit(EventKind::OutputItemDone {
                output_index,
                item: item.clone(),
            })
            .await?;

        Ok(())
    }
}

async fn run_streaming_turn(
    provider: &Arc<dyn Provider>,
    request: ProviderRequest,
    ctx: &RequestContext,
    emitter: &mut Emitter,
    output_offset: usize,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<TurnResult, TurnError> {
    let deadline = tokio::time::Instant::now() + timeout;

    let mut stream = tokio::select! {
        _ = cancel.cancelled() => return Err(TurnError::Cancelled),
        result = tokio::time::timeout_at(deadline, provider.stream(request, ctx)) => match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return Err(TurnError::Provider(err.into())),
            Err(_) => return Err(TurnError::Provider(protocol::Error::model_error("provider call timed out"))),
        },
    };

    let mut state = StreamState::new(output_offset);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            next = tokio::time::timeout_at(deadline, stream.next()) => match next {
                Ok(next) => next,
                Err(_) => return Err(TurnError::Provider(protocol::Error::model_error("provider stream timed out"))),
            },
        };

        let Some(event) = next else {
            break;
        };

        let event = match event {
            Ok(event) => event,
            Err(err) => return Err(TurnError::Provider(err.into())),
        };

        match event {
            ProviderEvent::TextDelta { delta } => {
                let slot = state.open_message(emitter).await?;
                let item_id = state.slots[slot].id.clone();
                let output_index = state.index_of(slot);

                if let Some(open) = &mut state.message {
                    open.text.push_str(&delta);
                }

                emitter
                    .emit(EventKind::OutputTextDelta {
                        item_id,
                        output_index,
                        content_index: 0,
                        delta,
                    })
                    .await?;
            }
            ProviderEvent::TextDone { text } => {
                state.open_message(emitter).await?;

                if let Some(open) = &mut state.message {
                    open.text = text;
                }

                state.close_message(emitter).await?;
            }
            ProviderEvent::RefusalDelta { delta } => {
                let slot = state.open_message(emitter).await?;
                let item_id = state.slots[slot].id.clone();
                let output_index = state.index_of(slot);

                if let Some(open) = &mut state.message {
                    open.refusal.push_str(&delta);
                }

                emitter
                    .emit(EventKind::RefusalDelta {
                        item_id,
                        output_index,
                        content_index: 0,
                        delta,
                    })
                    .await?;
            }
            ProviderEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments_fragment,
            } => {
                let slot = state.open_tool_call(emitter, index, id, name.clone()).await?;

                if let ItemPayload::FunctionCall(call) = &mut state.slots[slot].payload {
                    if let Some(name) = name
                        && call.name.is_empty()
                    {
                        call.name = name;
                    }

                    call.arguments.push_str(&arguments_fragment);
                }

                if !arguments_fragment.is_empty() {
                    emitter
                        .emit(EventKind::FunctionCallArgumentsDelta {
                            item_id: state.slots[slot].id.clone(),
                            output_index: state.index_of(slot),
                            delta: arguments_fragment,
                        })
                        .await?;
                }
            }
            ProviderEvent::ToolCallDone {
                index,
                id,
                name,
                arguments,
            } => {
                let slot = state.open_tool_call(emitter, index, Some(id.clone()), Some(name.clone())).await?;
                let output_index = state.index_of(slot);

                let item = &mut state.slots[slot];
                item.payload = ItemPayload::FunctionCall(protocol::FunctionCallPayload {
                    name,
                    call_id: id,
                    arguments: arguments.clone(),
                });
                item.status = ItemStatus::Completed;

                emitter
                    .emit(EventKind::FunctionCallArgumentsDone {
                        item_id: item.id.clone(),
                        output_index,
                        arguments,
                    })
                    .await?;

                let item = state.slots[slot].clone();
                emitter.emit(EventKind::OutputItemDone { output_index, item }).await?;
            }
            ProviderEvent::ReasoningDelta { delta } => {
                let slot = state.open_reasoning(emitter).await?;
                let item_id = state.slots[slot].id.clone();
                let output_index = state.index_of(slot);

                if let Some((_, buffered)) = &mut state.reasoning {
                    buffered.push_str(&delta);
                }

                emitter
                    .emit(EventKind::ReasoningTextDelta {
                        item_id,
                        output_index,
                        delta,
                    })
                    .await?;
            }
            ProviderEvent::ReasoningDone { text } => {
                state.open_reasoning(emitter).await?;
                state.close_reasoning(emitter, Some(text)).await?;
            }
            ProviderEvent::UsageReport { usage } => {
                state.usage.add(usage);
            }
            ProviderEvent::Finish { reason } => {
                state.finish = Some(reason);
            }
            ProviderEvent::Error { error } => {
                return Err(TurnError::Provider(protocol::Error::model_error(error)));
            }
            ProviderEvent::Extension { event_type, data } => {
                emitter.emit(EventKind::Extension { event_type, data }).await?;
            }
            ProviderEvent::Done => break,
        }
    }

    // Close anything the upstream left open.
    state.close_reasoning(emitter, None).await?;
    state.close_message(emitter).await?;

    let finish = state.finish.unwrap_or(FinishReason::Stop);

    Ok(TurnResult {
        items: state.slots,
        usage: state.usage,
        finish,
    })
}
