//! The authenticator chain.
//!
//! Each authenticator votes on a request: grant an identity, deny with an
//! error, or abstain. The first non-abstain vote wins. A fully-abstaining
//! chain is a denial when any authenticator is configured, and anonymous
//! access otherwise.

mod api_key;
mod jwks;
mod jwt;
mod layer;
mod mtls;
mod proxy;

use async_trait::async_trait;
use context::Identity;
use http::request::Parts;

pub(crate) use layer::AuthLayer;

/// An authenticator's verdict on one request.
pub(crate) enum Vote {
    Granted(Identity),
    Denied(protocol::Error),
    Abstain,
}

#[async_trait]
pub(crate) trait Authenticator: Send + Sync {
    async fn authenticate(&self, parts: &Parts) -> Vote;
}

pub(crate) struct AuthChain {
    authenticators: Vec<Box<dyn Authenticator>>,
}

impl AuthChain {
    pub fn from_config(config: &config::AuthConfig) -> Self {
        let mut authenticators: Vec<Box<dyn Authenticator>> = Vec::new();

        if !config.api_keys.is_empty() {
            authenticators.push(Box::new(api_key::ApiKeyAuthenticator::new(&config.api_keys)));
        }

        if let Some(jwt_config) = &config.jwt {
            authenticators.push(Box::new(jwt::JwtAuthenticator::new(jwt_config.clone())));
        }

        if let Some(proxy_config) = &config.oauth_proxy {
            authenticators.push(Box::new(proxy::ProxyHeaderAuthenticator::new(proxy_config.clone())));
        }

        if let Some(mtls_config) = &config.mtls {
            authenticators.push(Box::new(mtls::MtlsAuthenticator::new(mtls_config.clone())));
        }

        Self { authenticators }
    }

    pub fn is_enabled(&self) -> bool {
        !self.authenticators.is_empty()
    }

    /// Resolve the caller identity. `Ok(None)` means anonymous access on an
    /// unauthenticated deployment.
    pub async fn resolve(&self, parts: &Parts) -> Result<Option<Identity>, protocol::Error> {
        for authenticator in &self.authenticators {
            match authenticator.authenticate(parts).await {
                Vote::Granted(identity) => return Ok(Some(identity)),
                Vote::Denied(err) => return Err(err),
                Vote::Abstain => continue,
            }
        }

        if self.is_enabled() {
            Err(protocol::Error::unauthenticated("missing or invalid credentials"))
        } else {
            Ok(None)
        }
    }
}

/// Extract a bearer token from an Authorization header value.
/// RFC 7235: the scheme is case-insensitive.
pub(crate) fn bearer_token(value: &http::HeaderValue) -> Option<&str> {
    let value = value.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }

    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_parsing_is_scheme_insensitive() {
        let value = http::HeaderValue::from_static("Bearer abc");
        assert_eq!(bearer_token(&value), Some("abc"));

        let value = http::HeaderValue::from_static("bearer abc");
        assert_eq!(bearer_token(&value), Some("abc"));

        let value = http::HeaderValue::from_static("Basic abc");
        assert_eq!(bearer_token(&value), None);

        let value = http::HeaderValue::from_static("Bearer");
        assert_eq!(bearer_token(&value), None);
    }

    #[tokio::test]
    async fn empty_chain_is_anonymous() {
        let chain = AuthChain::from_config(&config::AuthConfig::default());
        let (parts, _) = http::Request::new(()).into_parts();

        assert!(!chain.is_enabled());
        assert!(chain.resolve(&parts).await.unwrap().is_none());
    }
}
