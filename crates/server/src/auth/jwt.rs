//! JWT validation against a remote JWKS.
//!
//! Accepts the RSA families RS256/RS384/RS512 and validates signature,
//! `exp`/`nbf`, and the configured `iss`/`aud` expectations. Keys are matched
//! by `kid` when the token names one.

use async_trait::async_trait;
use config::JwtConfig;
use context::{Claims, Identity};
use http::request::Parts;
use jwt_compact::{Algorithm, AlgorithmExt, TimeOptions, UntrustedToken, jwk::JsonWebKey};

use super::{Authenticator, Vote, bearer_token, jwks::{Jwk, JwksCache}};

pub(crate) struct JwtAuthenticator {
    config: JwtConfig,
    jwks: JwksCache,
}

impl JwtAuthenticator {
    pub fn new(config: JwtConfig) -> Self {
        let jwks = JwksCache::new(config.jwks_url.clone(), config.poll_interval, config.fetch_timeout);

        Self { config, jwks }
    }

    fn validate_token(&self, keys: &[Jwk], untrusted_token: &UntrustedToken<'_>) -> Option<jwt_compact::Token<Claims>> {
        let time_options = TimeOptions::default();
        let mut validation_results = Vec::new();

        // Collect all potential validation results to prevent timing attacks
        for jwk in keys {
            // Always check key ID match regardless of whether we'll use this key
            let kid_matches = match (&untrusted_token.header().key_id, &jwk.key_id) {
                (Some(expected), Some(kid)) => expected == kid,
                (Some(_), None) => false,
                (None, _) => true,
            };

            let Some(token) = decode_rsa(untrusted_token.algorithm(), &jwk.key, untrusted_token) else {
                continue;
            };

            let claims = token.claims();

            let time_valid = claims.validate_expiration(&time_options).is_ok()
                && (claims.not_before.is_none() || claims.validate_maturity(&time_options).is_ok());

            let issuer_valid = self.validate_issuer(&claims.custom);
            let audience_valid = self.validate_audience(&claims.custom);

            validation_results.push((kid_matches, time_valid, issuer_valid, audience_valid, token));
        }

        validation_results
            .into_iter()
            .find(|(kid_matches, time_valid, issuer_valid, audience_valid, _)| {
                *kid_matches && *time_valid && *issuer_valid && *audience_valid
            })
            .map(|(_, _, _, _, token)| token)
    }

    fn validate_issuer(&self, claims: &Claims) -> bool {
        let Some(expected_issuer) = &self.config.issuer else {
            return true;
        };

        match &claims.issuer {
            Some(issuer) if issuer == expected_issuer => true,
            Some(_) => {
                log::debug!("JWT validation failed: issuer claim does not match expected value");
                false
            }
            None => {
                log::debug!("JWT validation failed: issuer claim is missing from token");
                false
            }
        }
    }

    fn validate_audience(&self, claims: &Claims) -> bool {
        let Some(expected_audience) = &self.config.audience else {
            return true;
        };

        if claims
            .audience
            .as_ref()
            .is_some_and(|audiences| audiences.iter().any(|aud| aud == expected_audience))
        {
            true
        } else {
            log::debug!("JWT validation failed: audience claim does not match expected value");
            false
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, parts: &Parts) -> Vote {
        let Some(header) = parts.headers.get(http::header::AUTHORIZATION) else {
            return Vote::Abstain;
        };

        let Some(token_str) = bearer_token(header) else {
            return Vote::Abstain;
        };

        let Ok(untrusted_token) = UntrustedToken::new(token_str) else {
            // Not a JWT at all (an API key, say); someone else may claim it.
            return Vote::Abstain;
        };

        let keys = match self.jwks.get().await {
            Ok(keys) => keys,
            Err(err) => return Vote::Denied(err),
        };

        let Some(token) = self.validate_token(&keys, &untrusted_token) else {
            return Vote::Denied(protocol::Error::unauthenticated("invalid token"));
        };

        let claims = &token.claims().custom;

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("auth_method".to_string(), serde_json::Value::from("jwt"));

        if let Some(issuer) = &claims.issuer {
            metadata.insert("issuer".to_string(), serde_json::Value::from(issuer.clone()));
        }

        // The raw token is kept for downstream token exchange.
        metadata.insert("bearer_token".to_string(), serde_json::Value::from(token_str));

        let identity = Identity {
            subject: claims.subject.clone().unwrap_or_default(),
            scopes: claims.scopes(),
            tenant: claims.get_claim(&self.config.tenant_claim),
            metadata,
        };

        log::debug!("JWT resolved subject {}", identity.subject);
        Vote::Granted(identity)
    }
}

fn decode_rsa(
    alg_name: &str,
    jwk: &JsonWebKey<'_>,
    untrusted_token: &UntrustedToken<'_>,
) -> Option<jwt_compact::Token<Claims>> {
    use jwt_compact::alg::Rsa;

    match alg_name {
        "RS256" => decode(Rsa::rs256(), jwk, untrusted_token),
        "RS384" => decode(Rsa::rs384(), jwk, untrusted_token),
        "RS512" => decode(Rsa::rs512(), jwk, untrusted_token),
        _ => None,
    }
}

fn decode<A: Algorithm>(
    alg: A,
    jwk: &JsonWebKey<'_>,
    untrusted_token: &UntrustedToken<'_>,
) -> Option<jwt_compact::Token<Claims>>
where
    A::VerifyingKey: std::fmt::Debug + for<'a> TryFrom<&'a JsonWebKey<'a>>,
{
    let key = A::VerifyingKey::try_from(jwk).ok()?;
    alg.validator(&key).validate(untrusted_token).ok()
}
