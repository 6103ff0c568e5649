//! Per-server MCP authentication.
//!
//! Four strategies: a static bearer token, OAuth client-credentials with the
//! token cached and refreshed at 80% of its lifetime, OAuth token exchange
//! performed on every request with no caching, and a Kubernetes-projected
//! service-account token re-read from disk when the file rotates.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use config::{McpAuthConfig, OauthClientCredentialsConfig, OauthTokenExchangeConfig, ServiceAccountTokenConfig};
use context::RequestContext;
use notify::Watcher;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::ToolError;

pub(crate) enum ServerAuth {
    Static(String),
    ClientCredentials(ClientCredentials),
    TokenExchange(TokenExchange),
    ServiceAccount(ServiceAccountToken),
}

impl ServerAuth {
    pub fn from_config(config: &McpAuthConfig) -> Self {
        match config {
            McpAuthConfig::Token(token) => ServerAuth::Static(token.token.expose_secret().to_string()),
            McpAuthConfig::ClientCredentials(cc) => ServerAuth::ClientCredentials(ClientCredentials::new(cc.clone())),
            McpAuthConfig::TokenExchange(te) => ServerAuth::TokenExchange(TokenExchange::new(te.clone())),
            McpAuthConfig::ServiceAccount(sa) => ServerAuth::ServiceAccount(ServiceAccountToken::new(sa)),
        }
    }

    pub async fn bearer(&self, ctx: &RequestContext) -> Result<String, ToolError> {
        match self {
            ServerAuth::Static(token) => Ok(token.clone()),
            ServerAuth::ClientCredentials(cc) => cc.bearer().await,
            ServerAuth::TokenExchange(te) => te.bearer(ctx).await,
            ServerAuth::ServiceAccount(sa) => sa.bearer().await,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: String,
    fetched_at: Instant,
    lifetime: Duration,
}

impl CachedToken {
    /// Refresh once 80% of the lifetime has elapsed.
    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() >= self.lifetime.mul_f64(0.8)
    }
}

/// Client-credentials grant with a cached token.
pub(crate) struct ClientCredentials {
    config: OauthClientCredentialsConfig,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientCredentials {
    fn new(config: OauthClientCredentialsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    async fn bearer(&self) -> Result<String, ToolError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref()
            && !token.is_stale()
        {
            return Ok(token.token.clone());
        }

        log::debug!("refreshing client-credentials token from {}", self.config.token_url);

        let mut form = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.expose_secret().to_string()),
        ];

        if !self.config.scopes.is_empty() {
            form.push(("scope", self.config.scopes.join(" ")));
        }

        let response = fetch_token(&self.client, self.config.token_url.as_str(), &form).await?;
        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(300));

        let token = response.access_token;
        *cached = Some(CachedToken {
            token: token.clone(),
            fetched_at: Instant::now(),
            lifetime,
        });

        Ok(token)
    }
}

/// RFC 8693 token exchange, performed per request with no caching.
pub(crate) struct TokenExchange {
    config: OauthTokenExchangeConfig,
    client: reqwest::Client,
}

impl TokenExchange {
    fn new(config: OauthTokenExchangeConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn bearer(&self, ctx: &RequestContext) -> Result<String, ToolError> {
        let mut form = vec![
            ("grant_type", "urn:ietf:params:oauth:grant-type:token-exchange".to_string()),
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.expose_secret().to_string()),
        ];

        if let Some(audience) = &self.config.audience {
            form.push(("audience", audience.clone()));
        }

        // The caller's own token becomes the exchange subject when the auth
        // layer forwarded one.
        if let Some(subject) = ctx
            .identity
            .as_ref()
            .and_then(|identity| identity.metadata.get("bearer_token"))
            .and_then(|v| v.as_str())
        {
            form.push(("subject_token", subject.to_string()));
            form.push((
                "subject_token_type",
                "urn:ietf:params:oauth:token-type:access_token".to_string(),
            ));
        }

        let response = fetch_token(&self.client, self.config.token_url.as_str(), &form).await?;
        Ok(response.access_token)
    }
}

/// Projected service-account token with file-watch refresh.
pub(crate) struct ServiceAccountToken {
    path: PathBuf,
    dirty: Arc<AtomicBool>,
    cached: Mutex<Option<String>>,
    // Keeps the filesystem watcher alive.
    _watcher: Option<notify::RecommendedWatcher>,
}

impl ServiceAccountToken {
    fn new(config: &ServiceAccountTokenConfig) -> Self {
        let dirty = Arc::new(AtomicBool::new(false));

        let watcher = {
            let dirty = dirty.clone();

            let mut watcher = notify::recommended_watcher(move |event: Result<notify::Event, notify::Error>| {
                if event.is_ok() {
                    dirty.store(true, Ordering::Relaxed);
                }
            })
            .ok();

            if let Some(w) = watcher.as_mut()
                && let Err(e) = w.watch(&config.token_path, notify::RecursiveMode::NonRecursive)
            {
                log::warn!(
                    "failed to watch service-account token {}: {e}; will re-read on every call",
                    config.token_path.display()
                );
                watcher = None;
            }

            watcher
        };

        Self {
            path: config.token_path.clone(),
            dirty,
            cached: Mutex::new(None),
            _watcher: watcher,
        }
    }

    async fn bearer(&self) -> Result<String, ToolError> {
        let mut cached = self.cached.lock().await;

        let needs_read =
            cached.is_none() || self.dirty.swap(false, Ordering::Relaxed) || self._watcher.is_none();

        if needs_read {
            let token = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| {
                    ToolError::Unavailable(format!(
                        "failed to read service-account token {}: {e}",
                        self.path.display()
                    ))
                })?
                .trim()
                .to_string();

            *cached = Some(token);
        }

        cached
            .clone()
            .ok_or_else(|| ToolError::Unavailable("service-account token unavailable".to_string()))
    }
}

async fn fetch_token(client: &reqwest::Client, url: &str, form: &[(&str, String)]) -> Result<TokenResponse, ToolError> {
    let response = client
        .post(url)
        .form(form)
        .send()
        .await
        .map_err(|e| ToolError::Transport(format!("token endpoint unreachable: {e}")))?;

    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ToolError::Unavailable(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json()
        .await
        .map_err(|e| ToolError::Transport(format!("invalid token response: {e}")))
}
