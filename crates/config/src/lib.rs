//! Antwort configuration structures mapping the `config.yaml` file.

#![deny(missing_docs)]

mod agents;
mod auth;
mod engine;
mod limits;
mod llm;
mod loader;
mod server;
mod storage;
mod tools;

use std::path::Path;

pub use agents::AgentProfile;
pub use auth::{ApiKeyEntry, AuthConfig, JwtConfig, MtlsConfig, OauthProxyConfig};
pub use engine::EngineConfig;
pub use limits::{RateLimitConfig, RateLimitRule};
pub use llm::{LlmConfig, ProviderCapabilitiesConfig, ProviderConfig, ProviderType};
pub use loader::discover;
pub use server::{AdminConfig, ServerConfig};
pub use storage::{MemoryStorageConfig, PostgresStorageConfig, StorageConfig};
pub use tools::{
    BuiltinToolConfig, McpAuthConfig, McpConfig, McpProtocol, McpServerConfig,
    OauthClientCredentialsConfig, OauthTokenExchangeConfig, SandboxConfig,
    ServiceAccountTokenConfig, StaticTokenConfig, ToolsConfig,
};

/// Main configuration structure for the Antwort gateway.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// Authentication chain configuration.
    pub auth: AuthConfig,
    /// Rate limiting configuration.
    pub rate_limits: RateLimitConfig,
    /// Response persistence configuration.
    pub storage: StorageConfig,
    /// Inference backend configuration.
    pub llm: LlmConfig,
    /// Tool subsystem configuration.
    pub tools: ToolsConfig,
    /// Agentic loop configuration.
    pub engine: EngineConfig,
    /// Named agent profiles applying server-side request defaults.
    pub agents: std::collections::BTreeMap<String, AgentProfile>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(Some(path.as_ref()))
    }

    /// Load configuration using the discovery order: explicit path,
    /// `ANTWORT_CONFIG`, `./config.yaml`, `/etc/antwort/config.yaml`,
    /// defaults only. Environment variables prefixed `ANTWORT_` override
    /// file values either way.
    pub fn discover(explicit: Option<&Path>) -> anyhow::Result<Config> {
        loader::load(explicit)
    }

    /// Validates that the configuration has at least one usable inference
    /// backend.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::Config;

    #[test]
    fn defaults_are_usable() {
        let config: Config = serde_yaml::from_str("{}").unwrap();

        assert!(config.server.listen_address.is_none());
        assert!(!config.server.admin.enabled);
        assert!(config.auth.api_keys.is_empty());
        assert!(config.auth.jwt.is_none());
        assert!(!config.rate_limits.enabled);
        assert_eq!(config.engine.max_turns, 10);
        assert_eq!(config.engine.provider_timeout.as_secs(), 120);
        assert!(config.llm.providers.is_empty());
        assert!(config.tools.mcp.servers.is_empty());
        assert!(config.agents.is_empty());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<Config, _> = serde_yaml::from_str("surprise: true\n");
        assert!(result.is_err());
    }
}
