//! Static API-key lookup.

use async_trait::async_trait;
use config::ApiKeyEntry;
use context::Identity;
use http::request::Parts;
use secrecy::ExposeSecret;

use super::{Authenticator, Vote, bearer_token};

const API_KEY_HEADER: &str = "x-api-key";

pub(crate) struct ApiKeyAuthenticator {
    keys: Vec<ApiKeyEntry>,
}

impl ApiKeyAuthenticator {
    pub fn new(keys: &[ApiKeyEntry]) -> Self {
        Self { keys: keys.to_vec() }
    }

    fn lookup(&self, candidate: &str) -> Option<Identity> {
        let entry = self.keys.iter().find(|entry| entry.key.expose_secret() == candidate)?;

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("auth_method".to_string(), serde_json::Value::from("api_key"));

        Some(Identity {
            subject: entry.subject.clone(),
            scopes: entry.scopes.clone(),
            tenant: entry.tenant.clone(),
            metadata,
        })
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, parts: &Parts) -> Vote {
        // A dedicated header wins; a bearer token that happens to be a known
        // key also resolves. Anything else abstains so the JWT validator can
        // have a look at the same bearer.
        let candidate = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .or_else(|| parts.headers.get(http::header::AUTHORIZATION).and_then(bearer_token));

        let Some(candidate) = candidate else {
            return Vote::Abstain;
        };

        match self.lookup(candidate) {
            Some(identity) => {
                log::debug!("API key resolved subject {}", identity.subject);
                Vote::Granted(identity)
            }
            None => Vote::Abstain,
        }
    }
}
