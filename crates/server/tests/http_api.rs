//! HTTP surface tests against a scripted provider.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{Router, body::Body};
use context::RequestContext;
use engine::Engine;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use llm::{
    Capabilities, FinishReason, Model, Provider, ProviderEvent, ProviderRegistry, ProviderRequest, ProviderResponse,
    ProviderStream,
};
use protocol::{Item, Usage};
use serde_json::{Value, json};
use storage::{MemoryStore, ResponseStore};
use tower::ServiceExt;
use tools::ExecutorRegistry;

struct ScriptedProvider {
    turns: Mutex<VecDeque<ProviderResponse>>,
    stream_turns: Mutex<VecDeque<Vec<ProviderEvent>>>,
}

impl ScriptedProvider {
    fn with_text(text: &str) -> Arc<Self> {
        let provider = Arc::new(Self {
            turns: Mutex::new(VecDeque::new()),
            stream_turns: Mutex::new(VecDeque::new()),
        });

        provider.turns.lock().unwrap().push_back(ProviderResponse {
            output: vec![Item::assistant_text(text)],
            usage: Usage {
                input_tokens: 2,
                output_tokens: 2,
                total_tokens: 4,
                ..Default::default()
            },
            finish_reason: FinishReason::Stop,
        });

        provider
    }

    fn with_stream(events: Vec<ProviderEvent>) -> Arc<Self> {
        let provider = Arc::new(Self {
            turns: Mutex::new(VecDeque::new()),
            stream_turns: Mutex::new(VecDeque::new()),
        });

        provider.stream_turns.lock().unwrap().push_back(events);
        provider
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> &Capabilities {
        static CAPABILITIES: std::sync::OnceLock<Capabilities> = std::sync::OnceLock::new();

        CAPABILITIES.get_or_init(|| Capabilities {
            streaming: true,
            tool_calling: true,
            ..Default::default()
        })
    }

    async fn complete(
        &self,
        _request: ProviderRequest,
        _ctx: &RequestContext,
    ) -> Result<ProviderResponse, llm::LlmError> {
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(llm::LlmError::InternalError(None))
    }

    async fn stream(&self, _request: ProviderRequest, _ctx: &RequestContext) -> Result<ProviderStream, llm::LlmError> {
        let events = self
            .stream_turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(llm::LlmError::InternalError(None))?;

        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }

    async fn list_models(&self) -> anyhow::Result<Vec<Model>> {
        Ok(vec![Model {
            id: "scripted/test-model".to_string(),
            object: "model".to_string(),
            created: 0,
            owned_by: "scripted".to_string(),
        }])
    }
}

fn tenant_config() -> config::Config {
    serde_yaml::from_str(indoc::indoc! {r#"
        auth:
          api_keys:
            - key: "sk-tenant-a"
              subject: team-a
              tenant: tenant-a
            - key: "sk-tenant-b"
              subject: team-b
              tenant: tenant-b
        llm:
          providers:
            scripted:
              type: chat_completions
              base_url: "http://127.0.0.1:1/v1"
    "#})
    .unwrap()
}

fn open_config() -> config::Config {
    serde_yaml::from_str(indoc::indoc! {r#"
        llm:
          providers:
            scripted:
              type: chat_completions
              base_url: "http://127.0.0.1:1/v1"
    "#})
    .unwrap()
}

fn app(config: &config::Config, provider: Arc<ScriptedProvider>) -> Router {
    let store: Arc<dyn ResponseStore> = Arc::new(MemoryStore::default());

    let mut registry = ProviderRegistry::default();
    registry.insert(provider);

    let engine = Engine::new(
        registry,
        ExecutorRegistry::default(),
        Some(store.clone()),
        config::EngineConfig::default(),
        BTreeMap::new(),
    );

    server::router(config, engine, Some(store))
}

async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, body)
}

fn post_response(auth: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/responses")
        .header("content-type", "application/json");

    if let Some(key) = auth {
        builder = builder.header("authorization", format!("Bearer {key}"));
    }

    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_path(auth: Option<&str>, path: &str) -> Request<Body> {
    let mut builder = Request::builder().uri(path);

    if let Some(key) = auth {
        builder = builder.header("authorization", format!("Bearer {key}"));
    }

    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn create_and_fetch_response() {
    let config = open_config();
    let router = app(&config, ScriptedProvider::with_text("hello"));

    let (status, body) = send_json(
        &router,
        post_response(
            None,
            json!({
                "model": "test-model",
                "input": [{ "type": "message", "message": {
                    "role": "user",
                    "content": [{ "type": "input_text", "text": "hi" }]
                }}]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "response");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["output"][0]["type"], "message");
    assert_eq!(body["output"][0]["content"][0]["text"], "hello");
    assert!(body["usage"]["total_tokens"].as_u64().unwrap() > 0);

    let id = body["id"].as_str().unwrap().to_string();

    let (status, fetched) = send_json(&router, get_path(None, &format!("/v1/responses/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], id.as_str());

    let (status, items) = send_json(&router, get_path(None, &format!("/v1/responses/{id}/input_items"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(items["object"], "list");
    assert_eq!(items["data"][0]["type"], "message");
}

#[tokio::test]
async fn validation_errors_are_400_with_param() {
    let config = open_config();
    let router = app(&config, ScriptedProvider::with_text("unused"));

    let (status, body) = send_json(
        &router,
        post_response(None, json!({ "model": "test-model", "input": [] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request");
    assert_eq!(body["error"]["param"], "input");
}

#[tokio::test]
async fn malformed_body_is_a_wire_error() {
    let config = open_config();
    let router = app(&config, ScriptedProvider::with_text("unused"));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/responses")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send_json(&router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request");
}

#[tokio::test]
async fn cross_tenant_get_is_not_found() {
    let config = tenant_config();
    let router = app(&config, ScriptedProvider::with_text("tenant secret"));

    let (status, body) = send_json(
        &router,
        post_response(Some("sk-tenant-a"), json!({ "model": "test-model", "input": "hi" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let id = body["id"].as_str().unwrap().to_string();

    // The owner can read it back.
    let (status, _) = send_json(&router, get_path(Some("sk-tenant-a"), &format!("/v1/responses/{id}"))).await;
    assert_eq!(status, StatusCode::OK);

    // The other tenant gets the exact not-found body, never a 403.
    let (status, body) = send_json(&router, get_path(Some("sk-tenant-b"), &format!("/v1/responses/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({ "error": { "type": "not_found", "message": "response not found" } })
    );
}

#[tokio::test]
async fn missing_credentials_are_401() {
    let config = tenant_config();
    let router = app(&config, ScriptedProvider::with_text("x"));

    let (status, body) = send_json(&router, get_path(None, "/v1/responses")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "unauthenticated");
}

#[tokio::test]
async fn delete_returns_the_deleted_shape() {
    let config = open_config();
    let router = app(&config, ScriptedProvider::with_text("bye"));

    let (_, body) = send_json(
        &router,
        post_response(None, json!({ "model": "test-model", "input": "hi" })),
    )
    .await;
    let id = body["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/responses/{id}"))
        .body(Body::empty())
        .unwrap();

    let (status, body) = send_json(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "id": id, "object": "response.deleted", "deleted": true }));

    let (status, _) = send_json(&router, get_path(None, &format!("/v1/responses/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn streaming_response_frames_sse_with_done() {
    let config = open_config();
    let router = app(
        &config,
        ScriptedProvider::with_stream(vec![
            ProviderEvent::TextDelta { delta: "hel".into() },
            ProviderEvent::TextDelta { delta: "lo".into() },
            ProviderEvent::TextDone { text: "hello".into() },
            ProviderEvent::Finish {
                reason: FinishReason::Stop,
            },
            ProviderEvent::Done,
        ]),
    );

    let response = router
        .oneshot(post_response(
            None,
            json!({ "model": "test-model", "input": "hi", "stream": true }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"), "{content_type}");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(body.contains("event: response.created\n"));
    assert!(body.contains("event: response.output_text.delta\n"));
    assert!(body.contains("\"sequence_number\":0"));
    assert!(body.contains("event: response.completed\n"));
    assert!(body.ends_with("data: [DONE]\n\n"));
}

#[tokio::test]
async fn health_endpoints_and_models() {
    let config = open_config();
    let router = app(&config, ScriptedProvider::with_text("x"));

    let (status, body) = send_json(&router, get_path(None, "/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send_json(&router, get_path(None, "/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    let (status, body) = send_json(&router, get_path(None, "/v1/models")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], "scripted/test-model");
}

#[tokio::test]
async fn vector_store_surface_round_trips() {
    let config = open_config();
    let router = app(&config, ScriptedProvider::with_text("x"));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/vector_stores")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "name": "docs" }).to_string()))
        .unwrap();

    let (status, body) = send_json(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "vector_store");
    assert_eq!(body["name"], "docs");

    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send_json(&router, get_path(None, &format!("/v1/vector_stores/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
}
