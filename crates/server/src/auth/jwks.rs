//! TTL-bounded JWKS cache with double-checked refresh.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use jwt_compact::jwk::JsonWebKey;
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

/// One key of the JWKS document, keyed by `kid`.
pub(crate) struct Jwk {
    pub key_id: Option<String>,
    pub key: JsonWebKey<'static>,
}

struct Cached {
    keys: Arc<Vec<Jwk>>,
    fetched_at: Instant,
}

pub(crate) struct JwksCache {
    url: Url,
    poll_interval: Duration,
    fetch_timeout: Duration,
    client: reqwest::Client,
    cached: RwLock<Option<Cached>>,
}

impl JwksCache {
    pub fn new(url: Url, poll_interval: Duration, fetch_timeout: Duration) -> Self {
        Self {
            url,
            poll_interval,
            fetch_timeout,
            client: reqwest::Client::new(),
            cached: RwLock::new(None),
        }
    }

    /// The current key set, refreshed when older than the poll interval.
    /// Readers share the lock; the refresh re-checks under the write lock so
    /// concurrent expiries fetch once.
    pub async fn get(&self) -> Result<Arc<Vec<Jwk>>, protocol::Error> {
        {
            let cached = self.cached.read().await;

            if let Some(cached) = cached.as_ref()
                && cached.fetched_at.elapsed() < self.poll_interval
            {
                return Ok(cached.keys.clone());
            }
        }

        let mut cached = self.cached.write().await;

        if let Some(existing) = cached.as_ref()
            && existing.fetched_at.elapsed() < self.poll_interval
        {
            return Ok(existing.keys.clone());
        }

        let keys = match self.fetch().await {
            Ok(keys) => keys,
            Err(err) => {
                // A stale key set beats no key set while the issuer is down.
                if let Some(existing) = cached.as_ref() {
                    log::warn!("JWKS refresh failed, serving stale keys: {err}");
                    return Ok(existing.keys.clone());
                }

                return Err(err);
            }
        };

        let keys = Arc::new(keys);
        *cached = Some(Cached {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });

        Ok(keys)
    }

    async fn fetch(&self) -> Result<Vec<Jwk>, protocol::Error> {
        #[derive(Deserialize)]
        struct Document {
            keys: Vec<serde_json::Value>,
        }

        #[derive(Deserialize)]
        struct KeyHeader {
            #[serde(default)]
            kid: Option<String>,
        }

        log::debug!("fetching JWKS from {}", self.url);

        let response = self
            .client
            .get(self.url.clone())
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| protocol::Error::server_error(format!("JWKS fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(protocol::Error::server_error(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let document: Document = response
            .json()
            .await
            .map_err(|e| protocol::Error::server_error(format!("invalid JWKS document: {e}")))?;

        let mut keys = Vec::with_capacity(document.keys.len());

        for raw in document.keys {
            let header: KeyHeader = serde_json::from_value(raw.clone()).unwrap_or(KeyHeader { kid: None });

            match serde_json::from_value::<JsonWebKey<'static>>(raw) {
                Ok(key) => keys.push(Jwk {
                    key_id: header.kid,
                    key,
                }),
                Err(e) => log::warn!("skipping unparsable JWKS key: {e}"),
            }
        }

        if keys.is_empty() {
            return Err(protocol::Error::server_error("JWKS document contains no usable keys"));
        }

        Ok(keys)
    }
}
