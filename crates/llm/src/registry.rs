//! Named provider registry with `provider/model` routing.

use std::{collections::HashMap, sync::Arc};

use crate::{
    ChatCompletionsProvider, ResponsesProvider,
    error::LlmError,
    provider::{Model, Provider},
};

/// Routes model identifiers to configured backends.
///
/// A `name/model` id addresses the named provider; a bare model id goes to
/// the default provider.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: Option<String>,
}

impl ProviderRegistry {
    pub fn from_config(config: &config::LlmConfig) -> Self {
        let mut registry = Self {
            providers: HashMap::new(),
            default_provider: config.default_provider().map(str::to_string),
        };

        for (name, provider_config) in &config.providers {
            let provider: Arc<dyn Provider> = match provider_config.provider_type {
                config::ProviderType::ChatCompletions => {
                    Arc::new(ChatCompletionsProvider::new(name.clone(), provider_config))
                }
                config::ProviderType::Responses => Arc::new(ResponsesProvider::new(name.clone(), provider_config)),
            };

            registry.providers.insert(name.clone(), provider);
        }

        registry
    }

    /// Register a provider, making it the default if it is the first.
    pub fn insert(&mut self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();

        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }

        self.providers.insert(name, provider);
    }

    /// Resolve a request's model id to a backend and the model name the
    /// backend knows it by.
    pub fn resolve(&self, model: &str) -> Result<(Arc<dyn Provider>, String), LlmError> {
        let (provider, backend_model) = match model.split_once('/') {
            Some((prefix, rest)) if self.providers.contains_key(prefix) => {
                (self.providers[prefix].clone(), rest.to_string())
            }
            _ => {
                let name = self
                    .default_provider
                    .as_deref()
                    .ok_or_else(|| LlmError::ProviderNotFound(model.to_string()))?;

                let provider = self
                    .providers
                    .get(name)
                    .cloned()
                    .ok_or_else(|| LlmError::ProviderNotFound(name.to_string()))?;

                (provider, model.to_string())
            }
        };

        if !provider.capabilities().supports_model(&backend_model) {
            return Err(LlmError::ModelNotFound(format!(
                "Model '{backend_model}' is not served by provider '{}'",
                provider.name()
            )));
        }

        Ok((provider, backend_model))
    }

    /// Aggregate the model listings of every configured backend.
    pub async fn list_models(&self) -> Vec<Model> {
        let mut models = Vec::new();

        for provider in self.providers.values() {
            match provider.list_models().await {
                Ok(mut listed) => models.append(&mut listed),
                Err(e) => log::warn!("failed to list models for provider {}: {e}", provider.name()),
            }
        }

        models.sort_by(|a, b| a.id.cmp(&b.id));
        models
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use context::RequestContext;

    use crate::{
        Capabilities, ProviderRequest, ProviderResponse,
        event::{FinishReason, ProviderStream},
    };

    use super::*;

    struct StubProvider {
        name: String,
        capabilities: Capabilities,
    }

    impl StubProvider {
        fn named(name: &str, models: &[&str]) -> Arc<dyn Provider> {
            Arc::new(Self {
                name: name.to_string(),
                capabilities: Capabilities {
                    supported_models: models.iter().map(|m| m.to_string()).collect(),
                    ..Default::default()
                },
            })
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn capabilities(&self) -> &Capabilities {
            &self.capabilities
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
            _ctx: &RequestContext,
        ) -> Result<ProviderResponse, LlmError> {
            Ok(ProviderResponse {
                output: Vec::new(),
                usage: Default::default(),
                finish_reason: FinishReason::Stop,
            })
        }

        async fn stream(&self, _request: ProviderRequest, _ctx: &RequestContext) -> Result<ProviderStream, LlmError> {
            Err(LlmError::InternalError(None))
        }

        async fn list_models(&self) -> anyhow::Result<Vec<Model>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn prefixed_model_routes_to_named_provider() {
        let mut registry = ProviderRegistry::default();
        registry.insert(StubProvider::named("alpha", &[]));
        registry.insert(StubProvider::named("beta", &[]));

        let (provider, model) = registry.resolve("beta/some-model").unwrap();
        assert_eq!(provider.name(), "beta");
        assert_eq!(model, "some-model");
    }

    #[test]
    fn bare_model_uses_default_provider() {
        let mut registry = ProviderRegistry::default();
        registry.insert(StubProvider::named("alpha", &[]));

        let (provider, model) = registry.resolve("some-model").unwrap();
        assert_eq!(provider.name(), "alpha");
        assert_eq!(model, "some-model");
    }

    #[test]
    fn unsupported_model_is_rejected() {
        let mut registry = ProviderRegistry::default();
        registry.insert(StubProvider::named("alpha", &["served"]));

        registry.resolve("served").unwrap();

        let err = registry.resolve("other").unwrap_err();
        assert!(matches!(err, LlmError::ModelNotFound(_)));
    }
}
