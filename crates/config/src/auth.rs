//! Authentication chain configuration.
//!
//! Authenticators vote in a fixed order: API keys, JWT, OAuth-proxy headers,
//! forwarded mTLS certificates. A section that is absent simply abstains.

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Authentication chain configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Static API keys. Empty means the API-key authenticator abstains.
    pub api_keys: Vec<ApiKeyEntry>,
    /// JWT validation against a remote JWKS document.
    pub jwt: Option<JwtConfig>,
    /// Trusted identity headers set by an OAuth proxy in front of the gateway.
    pub oauth_proxy: Option<OauthProxyConfig>,
    /// Client certificate forwarded by the TLS-terminating ingress.
    pub mtls: Option<MtlsConfig>,
}

impl AuthConfig {
    /// Whether any authenticator is configured at all.
    pub fn enabled(&self) -> bool {
        !self.api_keys.is_empty() || self.jwt.is_some() || self.oauth_proxy.is_some() || self.mtls.is_some()
    }
}

/// One static API key and the identity it resolves to.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyEntry {
    /// The key value. Accepts `key_file` indirection via the loader.
    pub key: SecretString,
    /// Subject recorded on the resolved identity.
    pub subject: String,
    /// Tenant isolation key for this caller.
    #[serde(default)]
    pub tenant: Option<String>,
    /// Scopes granted to this key.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// JWT validation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JwtConfig {
    /// The JWKS document to validate token signatures against.
    pub jwks_url: Url,
    /// Expected `iss` claim; unset skips the check.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Expected `aud` claim; unset skips the check.
    #[serde(default)]
    pub audience: Option<String>,
    /// Claim path the tenant id is read from.
    #[serde(default = "default_tenant_claim")]
    pub tenant_claim: String,
    /// How long a fetched JWKS stays fresh before a refresh.
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "duration_str::deserialize_duration"
    )]
    pub poll_interval: Duration,
    /// Timeout for the JWKS fetch itself.
    #[serde(
        default = "default_fetch_timeout",
        deserialize_with = "duration_str::deserialize_duration"
    )]
    pub fetch_timeout: Duration,
}

fn default_tenant_claim() -> String {
    "tenant".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Identity headers written by a trusted OAuth proxy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OauthProxyConfig {
    /// Header carrying the authenticated subject.
    pub subject_header: String,
    /// Header carrying the tenant id, if the proxy provides one.
    pub tenant_header: Option<String>,
    /// Header carrying space-separated scopes.
    pub scopes_header: Option<String>,
}

impl Default for OauthProxyConfig {
    fn default() -> Self {
        Self {
            subject_header: "x-auth-request-user".to_string(),
            tenant_header: None,
            scopes_header: None,
        }
    }
}

/// Forwarded client-certificate extraction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MtlsConfig {
    /// Header the ingress forwards the (URL-encoded PEM) certificate in.
    pub certificate_header: String,
    /// Tenant id derived from the certificate's organization field.
    pub tenant_from_organization: bool,
}

impl Default for MtlsConfig {
    fn default() -> Self {
        Self {
            certificate_header: "x-forwarded-client-cert".to_string(),
            tenant_from_organization: false,
        }
    }
}
