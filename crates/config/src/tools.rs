//! Tool subsystem configuration: MCP servers, built-in providers, sandbox.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Tool subsystem configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    /// Downstream MCP servers.
    pub mcp: McpConfig,
    /// Built-in server-side tools.
    pub builtin: BTreeMap<String, BuiltinToolConfig>,
    /// Sandbox pod execution.
    pub sandbox: Option<SandboxConfig>,
}

/// Downstream MCP configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct McpConfig {
    /// Named MCP servers, referenced by tool definitions.
    pub servers: BTreeMap<String, McpServerConfig>,
}

/// One downstream MCP server. Subprocess transports are not supported on the
/// server side; only HTTP transports are accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct McpServerConfig {
    /// The server endpoint.
    pub url: Url,
    /// Which HTTP transport to use.
    #[serde(default)]
    pub protocol: McpProtocol,
    /// Per-server authentication.
    #[serde(default)]
    pub auth: Option<McpAuthConfig>,
    /// Per-call timeout.
    #[serde(
        default = "default_tool_timeout",
        deserialize_with = "duration_str::deserialize_duration"
    )]
    pub timeout: Duration,
}

/// The HTTP transport an MCP server speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum McpProtocol {
    /// HTTP + server-sent events.
    Sse,
    /// Streamable HTTP.
    #[default]
    StreamableHttp,
}

/// Per-server MCP authentication.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum McpAuthConfig {
    /// Static bearer token or headers.
    Token(StaticTokenConfig),
    /// OAuth client-credentials grant; token cached and refreshed at 80% of
    /// its lifetime.
    ClientCredentials(OauthClientCredentialsConfig),
    /// OAuth token exchange per request; never cached.
    TokenExchange(OauthTokenExchangeConfig),
    /// Kubernetes-projected service-account token re-read from disk when it
    /// rotates.
    ServiceAccount(ServiceAccountTokenConfig),
}

/// Static bearer token.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticTokenConfig {
    /// The token. Accepts `token_file` indirection via the loader.
    pub token: SecretString,
}

/// OAuth client-credentials settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OauthClientCredentialsConfig {
    /// Token endpoint.
    pub token_url: Url,
    /// Client identifier.
    pub client_id: String,
    /// Client secret. Accepts `client_secret_file` indirection.
    pub client_secret: SecretString,
    /// Requested scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// OAuth token-exchange settings (RFC 8693).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OauthTokenExchangeConfig {
    /// Token endpoint.
    pub token_url: Url,
    /// Client identifier.
    pub client_id: String,
    /// Client secret. Accepts `client_secret_file` indirection.
    pub client_secret: SecretString,
    /// Audience for the exchanged token.
    #[serde(default)]
    pub audience: Option<String>,
}

/// Projected service-account token settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceAccountTokenConfig {
    /// Path the token is projected at.
    pub token_path: PathBuf,
}

/// A built-in tool backed by an HTTP search/retrieval endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuiltinToolConfig {
    /// Endpoint invoked with the tool arguments.
    pub endpoint: Url,
    /// Per-call timeout.
    #[serde(
        default = "default_tool_timeout",
        deserialize_with = "duration_str::deserialize_duration"
    )]
    pub timeout: Duration,
}

/// Sandbox pod execution settings. The executor claims a pod and drives the
/// REST contract; it never runs code in-process.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxConfig {
    /// Sandbox service endpoint.
    pub endpoint: Url,
    /// Client certificate (PEM) for workload-identity mutual TLS.
    #[serde(default)]
    pub client_cert_path: Option<PathBuf>,
    /// Client private key (PEM).
    #[serde(default)]
    pub client_key_path: Option<PathBuf>,
    /// Root CA bundle to verify the sandbox with.
    #[serde(default)]
    pub root_ca_path: Option<PathBuf>,
    /// Execution timeout forwarded to the pod.
    #[serde(
        default = "default_execute_timeout",
        deserialize_with = "duration_str::deserialize_duration"
    )]
    pub execute_timeout: Duration,
}

fn default_tool_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_execute_timeout() -> Duration {
    Duration::from_secs(120)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn mcp_auth_variants_parse() {
        let config: McpConfig = serde_yaml::from_str(indoc! {r#"
            servers:
              docs:
                url: "https://mcp.example.com/sse"
                protocol: sse
                auth:
                  type: token
                  token: "secret"
              search:
                url: "https://mcp.example.com/mcp"
                auth:
                  type: client_credentials
                  token_url: "https://issuer.example.com/token"
                  client_id: antwort
                  client_secret: "hush"
                  scopes: ["mcp.read"]
        "#})
        .unwrap();

        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers["docs"].protocol, McpProtocol::Sse);
        assert!(matches!(
            config.servers["search"].auth,
            Some(McpAuthConfig::ClientCredentials(_))
        ));
        assert_eq!(config.servers["search"].protocol, McpProtocol::StreamableHttp);
    }

    #[test]
    fn sandbox_defaults() {
        let config: SandboxConfig = serde_yaml::from_str(indoc! {r#"
            endpoint: "https://sandbox.internal:8443"
        "#})
        .unwrap();

        assert_eq!(config.execute_timeout, Duration::from_secs(120));
        assert!(config.client_cert_path.is_none());
    }
}
