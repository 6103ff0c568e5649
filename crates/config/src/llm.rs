//! Inference backend configuration.

use std::{collections::BTreeMap, time::Duration};

use secrecy::SecretString;
use serde::Deserialize;

/// Inference backend configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider used for model ids without a `provider/` prefix. Defaults to
    /// the sole configured provider when there is exactly one.
    pub default_provider: Option<String>,
    /// Named providers, addressed as `name/model`.
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl LlmConfig {
    /// Whether at least one provider is configured.
    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// The effective default provider name.
    pub fn default_provider(&self) -> Option<&str> {
        if let Some(name) = &self.default_provider {
            return Some(name);
        }

        if self.providers.len() == 1 {
            return self.providers.keys().next().map(String::as_str);
        }

        None
    }
}

/// Which wire protocol the backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// OpenAI-compatible Chat Completions.
    ChatCompletions,
    /// Native Responses API passthrough.
    Responses,
}

/// One inference backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// The protocol the backend speaks.
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token sent to the backend. Accepts `api_key_file` indirection
    /// via the loader.
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Per-call timeout against this backend.
    #[serde(
        default = "default_provider_timeout",
        deserialize_with = "duration_str::deserialize_duration"
    )]
    pub timeout: Duration,
    /// Transient-failure retries before surfacing a model error.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Models served by this backend; empty means unrestricted.
    #[serde(default)]
    pub models: Vec<String>,
    /// Capability overrides for what the backend supports.
    #[serde(default)]
    pub capabilities: ProviderCapabilitiesConfig,
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_max_retries() -> u32 {
    3
}

/// Capability flags advertised for a backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderCapabilitiesConfig {
    /// Whether SSE streaming is supported.
    pub streaming: bool,
    /// Whether tool calling is supported.
    pub tool_calling: bool,
    /// Whether image input is supported.
    pub vision: bool,
    /// Whether audio input is supported.
    pub audio: bool,
    /// Whether the backend produces reasoning content.
    pub reasoning: bool,
    /// Maximum context window in tokens, if known.
    pub max_context_window: Option<u32>,
}

impl Default for ProviderCapabilitiesConfig {
    fn default() -> Self {
        Self {
            streaming: true,
            tool_calling: true,
            vision: false,
            audio: false,
            reasoning: false,
            max_context_window: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn provider_defaults() {
        let config: ProviderConfig = serde_yaml::from_str(indoc! {r#"
            type: chat_completions
            base_url: "http://localhost:11434/v1"
        "#})
        .unwrap();

        assert_eq!(config.provider_type, ProviderType::ChatCompletions);
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.max_retries, 3);
        assert!(config.capabilities.streaming);
        assert!(!config.capabilities.reasoning);
    }

    #[test]
    fn single_provider_is_the_default() {
        let config: LlmConfig = serde_yaml::from_str(indoc! {r#"
            providers:
              local:
                type: chat_completions
                base_url: "http://localhost:11434/v1"
        "#})
        .unwrap();

        assert_eq!(config.default_provider(), Some("local"));
    }
}
