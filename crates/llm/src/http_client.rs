use std::{sync::OnceLock, time::Duration};

use reqwest::{Client, header};

/// Shared upstream HTTP client, reused across providers so backends sit on
/// warm keep-alive connections. No global timeout: every provider call sets
/// its own per-request deadline from configuration.
pub(crate) fn http_client() -> reqwest::Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();

    CLIENT
        .get_or_init(|| {
            let mut headers = header::HeaderMap::new();
            headers.insert(header::CONNECTION, header::HeaderValue::from_static("keep-alive"));

            Client::builder()
                // A short idle timeout is what actually picks up upstream
                // DNS changes; hyper's pool has no connection TTL.
                .pool_idle_timeout(Some(Duration::from_secs(5)))
                .tcp_nodelay(true)
                .tcp_keepalive(Some(Duration::from_secs(60)))
                .default_headers(headers)
                .build()
                .expect("Failed to build default HTTP client")
        })
        .clone()
}
