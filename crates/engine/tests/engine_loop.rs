//! End-to-end loop tests against a scripted provider.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use context::RequestContext;
use engine::Engine;
use futures::StreamExt;
use llm::{
    Capabilities, FinishReason, Model, Provider, ProviderEvent, ProviderRequest, ProviderResponse, ProviderStream,
    ProviderRegistry,
};
use protocol::{
    CreateResponseRequest, EventKind, Item, ItemStatus, ResponseStatus, ToolDefinition, ToolKind, Usage,
};
use storage::{MemoryStore, ResponseStore};
use tokio_util::sync::CancellationToken;
use tools::{ExecutorRegistry, FunctionExecutor, ToolCall, ToolError, ToolExecutor, ToolOutcome};

struct MockProvider {
    turns: Mutex<VecDeque<ProviderResponse>>,
    stream_turns: Mutex<VecDeque<Vec<ProviderEvent>>>,
    captured: Mutex<Vec<ProviderRequest>>,
    capabilities: Capabilities,
}

impl MockProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(VecDeque::new()),
            stream_turns: Mutex::new(VecDeque::new()),
            captured: Mutex::new(Vec::new()),
            capabilities: Capabilities {
                streaming: true,
                tool_calling: true,
                ..Default::default()
            },
        })
    }

    fn push_turn(&self, output: Vec<Item>, finish_reason: FinishReason) {
        self.turns.lock().unwrap().push_back(ProviderResponse {
            output,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
                ..Default::default()
            },
            finish_reason,
        });
    }

    fn push_stream_turn(&self, events: Vec<ProviderEvent>) {
        self.stream_turns.lock().unwrap().push_back(events);
    }

    fn captured_requests(&self) -> Vec<ProviderRequest> {
        self.captured.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn complete(
        &self,
        request: ProviderRequest,
        _ctx: &RequestContext,
    ) -> Result<ProviderResponse, llm::LlmError> {
        self.captured.lock().unwrap().push(request);

        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| llm::LlmError::InternalError(Some("mock provider ran out of turns".to_string())))
    }

    async fn stream(
        &self,
        request: ProviderRequest,
        _ctx: &RequestContext,
    ) -> Result<ProviderStream, llm::LlmError> {
        self.captured.lock().unwrap().push(request);

        let events = self
            .stream_turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| llm::LlmError::InternalError(Some("mock provider ran out of stream turns".to_string())))?;

        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }

    async fn list_models(&self) -> anyhow::Result<Vec<Model>> {
        Ok(Vec::new())
    }
}

/// A stand-in search backend: every call returns `result-X`.
struct MockSearchExecutor;

#[async_trait]
impl ToolExecutor for MockSearchExecutor {
    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }

    fn can_execute(&self, definition: &ToolDefinition) -> bool {
        definition.tool_type == "web_search"
    }

    async fn execute(&self, _ctx: &RequestContext, _call: &ToolCall) -> Result<ToolOutcome, ToolError> {
        Ok(ToolOutcome::Output("result-X".to_string()))
    }
}

fn engine_with(provider: Arc<MockProvider>, store: Option<Arc<dyn ResponseStore>>) -> Engine {
    let mut registry = ProviderRegistry::default();
    registry.insert(provider);

    let mut executors = ExecutorRegistry::default();
    executors.register(Arc::new(FunctionExecutor));
    executors.register(Arc::new(MockSearchExecutor));

    Engine::new(
        registry,
        executors,
        store,
        config::EngineConfig::default(),
        BTreeMap::new(),
    )
}

fn web_search_tool() -> ToolDefinition {
    serde_json::from_value(serde_json::json!({ "type": "web_search" })).unwrap()
}

#[tokio::test]
async fn non_streaming_single_turn_echo() {
    let provider = MockProvider::new();
    provider.push_turn(vec![Item::assistant_text("hello")], FinishReason::Stop);

    let store: Arc<dyn ResponseStore> = Arc::new(MemoryStore::default());
    let engine = engine_with(provider, Some(store.clone()));

    let request = CreateResponseRequest::user_text("m", "hi");
    let ctx = RequestContext::default();

    let response = engine.run(request, &ctx, CancellationToken::new()).await.unwrap();

    assert_eq!(response.status, ResponseStatus::Completed);
    assert_eq!(response.output.len(), 1);

    let message = response.output[0].as_message().unwrap();
    assert_eq!(message.role, protocol::Role::Assistant);
    assert_eq!(message.content.text(), "hello");

    assert!(response.usage.unwrap().total_tokens > 0);

    // store defaults to true, so the response is persisted.
    let persisted = store.get_response(&ctx, &response.id).await.unwrap();
    assert_eq!(persisted.response.id, response.id);
    assert_eq!(persisted.input.len(), 1);
}

#[tokio::test]
async fn streaming_text_event_sequence() {
    let provider = MockProvider::new();
    provider.push_stream_turn(vec![
        ProviderEvent::TextDelta { delta: "hel".into() },
        ProviderEvent::TextDelta { delta: "lo".into() },
        ProviderEvent::TextDone { text: "hello".into() },
        ProviderEvent::UsageReport {
            usage: Usage {
                input_tokens: 3,
                output_tokens: 2,
                total_tokens: 5,
                ..Default::default()
            },
        },
        ProviderEvent::Finish {
            reason: FinishReason::Stop,
        },
        ProviderEvent::Done,
    ]);

    let engine = engine_with(provider, Some(Arc::new(MemoryStore::default())));

    let mut request = CreateResponseRequest::user_text("m", "hi");
    request.stream = Some(true);

    let stream = engine
        .stream(request, &RequestContext::default(), CancellationToken::new())
        .await
        .unwrap();

    let events: Vec<_> = stream.collect().await;
    let types: Vec<String> = events.iter().map(|e| e.event_type()).collect();

    assert_eq!(
        types,
        vec![
            "response.created",
            "response.in_progress",
            "response.output_item.added",
            "response.content_part.added",
            "response.output_text.delta",
            "response.output_text.delta",
            "response.output_text.done",
            "response.content_part.done",
            "response.output_item.done",
            "response.completed",
        ]
    );

    // Sequence numbers are exactly 0..n.
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence_number, i as u64);
    }

    let EventKind::OutputTextDelta { delta, .. } = &events[4].kind else {
        unreachable!("expected a text delta");
    };
    assert_eq!(delta, "hel");

    let EventKind::ResponseCompleted { response } = &events[9].kind else {
        unreachable!("expected the completed snapshot");
    };
    assert_eq!(response.status, ResponseStatus::Completed);
    assert_eq!(response.output[0].as_message().unwrap().content.text(), "hello");
}

#[tokio::test]
async fn agentic_two_turn_with_server_tool() {
    let provider = MockProvider::new();
    provider.push_turn(
        vec![Item::function_call(
            "web_search",
            "call_1",
            r#"{"query":"antwort"}"#,
            ItemStatus::Completed,
        )],
        FinishReason::ToolCalls,
    );
    provider.push_turn(
        vec![Item::assistant_text("according to result-X, yes")],
        FinishReason::Stop,
    );

    let engine = engine_with(provider.clone(), Some(Arc::new(MemoryStore::default())));

    let mut request = CreateResponseRequest::user_text("m", "is antwort a gateway?");
    request.tools = vec![web_search_tool()];

    let response = engine
        .run(request, &RequestContext::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status, ResponseStatus::Completed);
    assert_eq!(response.output.len(), 3);

    assert_eq!(response.output[0].as_function_call().unwrap().name, "web_search");
    assert_eq!(
        response.output[1].as_function_call_output().unwrap().output,
        "result-X"
    );
    assert_eq!(
        response.output[2].as_message().unwrap().content.text(),
        "according to result-X, yes"
    );

    // The second turn saw the tool result in its conversation.
    let captured = provider.captured_requests();
    assert_eq!(captured.len(), 2);

    let second_turn = &captured[1];
    assert!(second_turn.messages.iter().any(|m| {
        m.tool_call_id.as_deref() == Some("call_1") && m.content.as_text() == Some("result-X")
    }));
}

#[tokio::test]
async fn streaming_tool_turn_emits_lifecycle_events() {
    let provider = MockProvider::new();
    provider.push_stream_turn(vec![
        ProviderEvent::ToolCallDelta {
            index: 0,
            id: Some("call_1".into()),
            name: Some("web_search".into()),
            arguments_fragment: r#"{"query":"#.into(),
        },
        ProviderEvent::ToolCallDelta {
            index: 0,
            id: None,
            name: None,
            arguments_fragment: r#""x"}"#.into(),
        },
        ProviderEvent::ToolCallDone {
            index: 0,
            id: "call_1".into(),
            name: "web_search".into(),
            arguments: r#"{"query":"x"}"#.into(),
        },
        ProviderEvent::Finish {
            reason: FinishReason::ToolCalls,
        },
        ProviderEvent::Done,
    ]);
    provider.push_stream_turn(vec![
        ProviderEvent::TextDelta { delta: "done".into() },
        ProviderEvent::TextDone { text: "done".into() },
        ProviderEvent::Finish {
            reason: FinishReason::Stop,
        },
        ProviderEvent::Done,
    ]);

    let engine = engine_with(provider, Some(Arc::new(MemoryStore::default())));

    let mut request = CreateResponseRequest::user_text("m", "search please");
    request.tools = vec![web_search_tool()];
    request.stream = Some(true);

    let stream = engine
        .stream(request, &RequestContext::default(), CancellationToken::new())
        .await
        .unwrap();

    let events: Vec<_> = stream.collect().await;
    let types: Vec<String> = events.iter().map(|e| e.event_type()).collect();

    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence_number, i as u64);
    }

    assert!(types.contains(&"response.function_call_arguments.delta".to_string()));
    assert!(types.contains(&"response.function_call_arguments.done".to_string()));
    assert!(types.contains(&"response.web_search_call.in_progress".to_string()));
    assert!(types.contains(&"response.web_search_call.searching".to_string()));
    assert!(types.contains(&"response.web_search_call.completed".to_string()));
    assert_eq!(types.last().unwrap(), "response.completed");

    // The tool lifecycle sits between the first and second model turns.
    let in_progress = types.iter().position(|t| t == "response.web_search_call.in_progress").unwrap();
    let args_done = types.iter().position(|t| t == "response.function_call_arguments.done").unwrap();
    let text_delta = types.iter().position(|t| t == "response.output_text.delta").unwrap();
    assert!(args_done < in_progress);
    assert!(in_progress < text_delta);
}

#[tokio::test]
async fn client_function_tool_pauses_the_loop() {
    let provider = MockProvider::new();
    provider.push_turn(
        vec![Item::function_call(
            "get_weather",
            "call_1",
            r#"{"city":"Berlin"}"#,
            ItemStatus::Completed,
        )],
        FinishReason::ToolCalls,
    );

    let store: Arc<dyn ResponseStore> = Arc::new(MemoryStore::default());
    let engine = engine_with(provider, Some(store.clone()));

    let mut request = CreateResponseRequest::user_text("m", "weather?");
    request.tools = vec![ToolDefinition::function("get_weather", None, None)];

    let ctx = RequestContext::default();
    let response = engine.run(request, &ctx, CancellationToken::new()).await.unwrap();

    assert_eq!(response.status, ResponseStatus::RequiresAction);
    assert_eq!(response.output.len(), 1);
    assert!(response.output[0].as_function_call().is_some());

    // No synthetic output was produced for the delegated call.
    let persisted = store.get_response(&ctx, &response.id).await.unwrap();
    assert!(
        persisted
            .response
            .output
            .iter()
            .all(|item| item.as_function_call_output().is_none())
    );
}

#[tokio::test]
async fn chain_reconstruction_prepends_ancestor_turns() {
    let provider = MockProvider::new();
    provider.push_turn(vec![Item::assistant_text("first answer")], FinishReason::Stop);
    provider.push_turn(vec![Item::assistant_text("second answer")], FinishReason::Stop);

    let store: Arc<dyn ResponseStore> = Arc::new(MemoryStore::default());
    let engine = engine_with(provider.clone(), Some(store));
    let ctx = RequestContext::default();

    let first = engine
        .run(
            CreateResponseRequest::user_text("m", "u1"),
            &ctx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let mut second_request = CreateResponseRequest::user_text("m", "u2");
    second_request.previous_response_id = Some(first.id.clone());

    let second = engine.run(second_request, &ctx, CancellationToken::new()).await.unwrap();
    assert_eq!(second.previous_response_id.as_deref(), Some(first.id.as_str()));

    let captured = provider.captured_requests();
    let texts: Vec<Option<String>> = captured[1]
        .messages
        .iter()
        .map(|m| m.content.as_text().map(str::to_string))
        .collect();

    // [u1, a1, u2] in that exact order.
    assert_eq!(
        texts,
        vec![
            Some("u1".to_string()),
            Some("first answer".to_string()),
            Some("u2".to_string()),
        ]
    );
}

#[tokio::test]
async fn allowlist_violation_feeds_error_back() {
    let provider = MockProvider::new();
    provider.push_turn(
        vec![Item::function_call("web_search", "call_1", "{}", ItemStatus::Completed)],
        FinishReason::ToolCalls,
    );
    provider.push_turn(vec![Item::assistant_text("fine, no search")], FinishReason::Stop);

    let engine = engine_with(provider.clone(), Some(Arc::new(MemoryStore::default())));

    let mut request = CreateResponseRequest::user_text("m", "hi");
    request.tools = vec![web_search_tool()];
    request.allowed_tools = Some(vec![]);

    let response = engine
        .run(request, &RequestContext::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status, ResponseStatus::Completed);

    let output = response.output[1].as_function_call_output().unwrap();
    assert_eq!(output.call_id, "call_1");
    assert!(output.output.contains("not in the allowed tools list"));

    // The error output looped back to the model, not to the provider as a
    // real execution.
    let captured = provider.captured_requests();
    assert_eq!(captured.len(), 2);
}

#[tokio::test]
async fn turn_bound_finishes_incomplete() {
    let provider = MockProvider::new();

    for i in 0..20 {
        provider.push_turn(
            vec![Item::function_call(
                "web_search",
                format!("call_{i}"),
                "{}",
                ItemStatus::Completed,
            )],
            FinishReason::ToolCalls,
        );
    }

    let engine = engine_with(provider, Some(Arc::new(MemoryStore::default())));

    let mut request = CreateResponseRequest::user_text("m", "loop forever");
    request.tools = vec![web_search_tool()];

    let response = engine
        .run(request, &RequestContext::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status, ResponseStatus::Incomplete);
    assert_eq!(
        response.incomplete_details.unwrap().reason,
        "max_tool_calls"
    );
}

#[tokio::test]
async fn store_false_skips_persistence() {
    let provider = MockProvider::new();
    provider.push_turn(vec![Item::assistant_text("ok")], FinishReason::Stop);

    let store: Arc<dyn ResponseStore> = Arc::new(MemoryStore::default());
    let engine = engine_with(provider, Some(store.clone()));

    let mut request = CreateResponseRequest::user_text("m", "hi");
    request.store = Some(false);

    let ctx = RequestContext::default();
    let response = engine.run(request, &ctx, CancellationToken::new()).await.unwrap();

    assert_eq!(response.status, ResponseStatus::Completed);
    assert!(matches!(
        store.get_response(&ctx, &response.id).await,
        Err(storage::StoreError::NotFound)
    ));
}

#[tokio::test]
async fn provider_failure_becomes_failed_response() {
    let provider = MockProvider::new();
    // No scripted turns: the mock errors out.

    let engine = engine_with(provider, Some(Arc::new(MemoryStore::default())));

    let response = engine
        .run(
            CreateResponseRequest::user_text("m", "hi"),
            &RequestContext::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(response.error.is_some());
}

#[tokio::test]
async fn unknown_agent_profile_is_invalid_request() {
    let provider = MockProvider::new();
    let engine = engine_with(provider, Some(Arc::new(MemoryStore::default())));

    let mut request = CreateResponseRequest::user_text("m", "hi");
    request.agent = Some("researcher".to_string());

    let err = engine
        .run(request, &RequestContext::default(), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, protocol::ErrorKind::InvalidRequest);
    assert_eq!(err.param.as_deref(), Some("agent"));
}
