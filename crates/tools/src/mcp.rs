//! MCP tool execution against downstream servers.
//!
//! One lazily-connected client per configured server. A server's
//! `tools/list` is fetched on first use and cached for the life of the
//! connection; a disconnect during a call surfaces as an error result that is
//! fed back to the model, and the next call reconnects. Only HTTP transports
//! are supported; subprocess servers are out of scope on the server side.

pub(crate) mod auth;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use config::{McpConfig, McpProtocol, McpServerConfig};
use context::RequestContext;
use protocol::{ToolDefinition, ToolKind};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use rmcp::{
    RoleClient, ServiceExt,
    model::CallToolRequestParam,
    service::RunningService,
    transport::{
        SseClientTransport, StreamableHttpClientTransport,
        common::client_side_sse::FixedInterval,
        sse_client::SseClientConfig,
        streamable_http_client::StreamableHttpClientTransportConfig,
    },
};
use tokio::sync::Mutex;

use crate::{ToolCall, ToolError, ToolExecutor, ToolOutcome};

use self::auth::ServerAuth;

struct Connection {
    service: RunningService<RoleClient, ()>,
    /// Bearer the connection was built with; a rotated token forces a
    /// reconnect.
    token: Option<String>,
    tools: Option<Arc<Vec<rmcp::model::Tool>>>,
}

struct ServerHandle {
    name: String,
    config: McpServerConfig,
    auth: Option<ServerAuth>,
    state: Mutex<Option<Connection>>,
}

impl ServerHandle {
    async fn connect(&self, token: Option<String>) -> Result<Connection, ToolError> {
        let mut builder = reqwest::Client::builder();

        if let Some(token) = &token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ToolError::Unavailable(format!("invalid bearer token for {}: {e}", self.name)))?;

            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|e| ToolError::Transport(format!("failed to build MCP client: {e}")))?;

        let service = match self.config.protocol {
            McpProtocol::StreamableHttp => {
                let transport_config = StreamableHttpClientTransportConfig::with_uri(self.config.url.to_string());
                let transport = StreamableHttpClientTransport::with_client(client, transport_config);

                ().serve(transport)
                    .await
                    .map_err(|e| ToolError::Transport(format!("failed to connect to MCP server {}: {e}", self.name)))?
            }
            McpProtocol::Sse => {
                let client_config = SseClientConfig {
                    sse_endpoint: self.config.url.to_string().into(),
                    retry_policy: Arc::new(FixedInterval::default()),
                    use_message_endpoint: None,
                };

                let transport = SseClientTransport::start_with_client(client, client_config)
                    .await
                    .map_err(|e| ToolError::Transport(format!("failed to start SSE transport for {}: {e}", self.name)))?;

                ().serve(transport)
                    .await
                    .map_err(|e| ToolError::Transport(format!("failed to connect to MCP server {}: {e}", self.name)))?
            }
        };

        log::debug!("connected to MCP server {}", self.name);

        Ok(Connection {
            service,
            token,
            tools: None,
        })
    }

    async fn call(&self, ctx: &RequestContext, call: &ToolCall) -> Result<ToolOutcome, ToolError> {
        let token = match &self.auth {
            Some(auth) => Some(auth.bearer(ctx).await?),
            None => None,
        };

        let mut state = self.state.lock().await;

        let needs_connect = match state.as_ref() {
            Some(connection) => connection.token != token,
            None => true,
        };

        if needs_connect {
            *state = Some(self.connect(token).await?);
        }

        let connection = state.as_mut().ok_or_else(|| ToolError::Unavailable(self.name.clone()))?;

        // Lazy discovery: tools/list once per connection, then cached.
        if connection.tools.is_none() {
            let tools = connection
                .service
                .list_tools(Default::default())
                .await
                .map_err(|e| {
                    ToolError::Transport(format!("tools/list failed for MCP server {}: {e}", self.name))
                })?
                .tools;

            log::debug!("discovered {} tools on MCP server {}", tools.len(), self.name);
            connection.tools = Some(Arc::new(tools));
        }

        let tool_name = call
            .definition
            .extra
            .get("tool_name")
            .and_then(|v| v.as_str())
            .unwrap_or(&call.name)
            .to_string();

        let known = connection
            .tools
            .as_ref()
            .is_some_and(|tools| tools.iter().any(|tool| tool.name == tool_name));

        if !known {
            return Err(ToolError::InvalidArguments(format!(
                "MCP server {} does not expose a tool named {tool_name}",
                self.name
            )));
        }

        let arguments: Option<serde_json::Map<String, serde_json::Value>> = if call.arguments.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(&call.arguments)
                    .map_err(|e| ToolError::InvalidArguments(format!("arguments are not a JSON object: {e}")))?,
            )
        };

        let result = connection
            .service
            .call_tool(CallToolRequestParam {
                name: tool_name.clone().into(),
                arguments,
            })
            .await;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                // Drop the connection so the next call reconnects.
                *state = None;
                return Err(ToolError::Transport(format!(
                    "MCP call to server {} failed: {e}",
                    self.name
                )));
            }
        };

        let text: Vec<String> = result
            .content
            .iter()
            .filter_map(|content| content.as_text().map(|t| t.text.clone()))
            .collect();
        let output = text.join("\n");

        if result.is_error.unwrap_or(false) {
            return Err(ToolError::Transport(if output.is_empty() {
                format!("MCP tool {tool_name} reported an error")
            } else {
                output
            }));
        }

        Ok(ToolOutcome::Output(output))
    }
}

/// Server-side MCP dispatch, one handle per configured server.
pub struct McpExecutor {
    servers: HashMap<String, Arc<ServerHandle>>,
}

impl McpExecutor {
    pub fn new(config: &McpConfig) -> Self {
        let servers = config
            .servers
            .iter()
            .map(|(name, server_config)| {
                let handle = ServerHandle {
                    name: name.clone(),
                    config: server_config.clone(),
                    auth: server_config.auth.as_ref().map(ServerAuth::from_config),
                    state: Mutex::new(None),
                };

                (name.clone(), Arc::new(handle))
            })
            .collect();

        Self { servers }
    }

    /// The server a definition addresses, via its `server_label`.
    fn server_for(&self, definition: &ToolDefinition) -> Option<&Arc<ServerHandle>> {
        let label = definition
            .extra
            .get("server_label")
            .and_then(|v| v.as_str())
            .or(definition.name.as_deref())?;

        self.servers.get(label)
    }
}

#[async_trait]
impl ToolExecutor for McpExecutor {
    fn kind(&self) -> ToolKind {
        ToolKind::Mcp
    }

    fn can_execute(&self, definition: &ToolDefinition) -> bool {
        self.server_for(definition).is_some()
    }

    async fn execute(&self, ctx: &RequestContext, call: &ToolCall) -> Result<ToolOutcome, ToolError> {
        let server = self
            .server_for(&call.definition)
            .ok_or_else(|| ToolError::Unavailable(format!("no MCP server configured for tool {}", call.name)))?
            .clone();

        server.call(ctx, call).await
    }
}
