//! Trusted identity headers from an OAuth proxy in front of the gateway.

use async_trait::async_trait;
use config::OauthProxyConfig;
use context::Identity;
use http::request::Parts;

use super::{Authenticator, Vote};

pub(crate) struct ProxyHeaderAuthenticator {
    config: OauthProxyConfig,
}

impl ProxyHeaderAuthenticator {
    pub fn new(config: OauthProxyConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Authenticator for ProxyHeaderAuthenticator {
    async fn authenticate(&self, parts: &Parts) -> Vote {
        let Some(subject) = parts
            .headers
            .get(&self.config.subject_header)
            .and_then(|value| value.to_str().ok())
            .filter(|subject| !subject.is_empty())
        else {
            return Vote::Abstain;
        };

        let tenant = self
            .config
            .tenant_header
            .as_ref()
            .and_then(|header| parts.headers.get(header))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let scopes = self
            .config
            .scopes_header
            .as_ref()
            .and_then(|header| parts.headers.get(header))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("auth_method".to_string(), serde_json::Value::from("oauth_proxy"));

        Vote::Granted(Identity {
            subject: subject.to_string(),
            scopes,
            tenant,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn proxy_headers_resolve_identity() {
        let auth = ProxyHeaderAuthenticator::new(OauthProxyConfig {
            subject_header: "x-auth-request-user".to_string(),
            tenant_header: Some("x-auth-request-tenant".to_string()),
            scopes_header: None,
        });

        let request = http::Request::builder()
            .header("x-auth-request-user", "alice")
            .header("x-auth-request-tenant", "acme")
            .body(())
            .unwrap();

        let vote = auth.authenticate(&request.into_parts().0).await;
        let Vote::Granted(identity) = vote else {
            unreachable!("expected a grant");
        };

        assert_eq!(identity.subject, "alice");
        assert_eq!(identity.tenant.as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn missing_header_abstains() {
        let auth = ProxyHeaderAuthenticator::new(OauthProxyConfig::default());
        let request = http::Request::builder().body(()).unwrap();

        assert!(matches!(auth.authenticate(&request.into_parts().0).await, Vote::Abstain));
    }
}
