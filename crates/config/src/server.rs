//! HTTP server configuration settings.

use std::{net::SocketAddr, time::Duration};

use serde::Deserialize;

/// HTTP server configuration settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
    /// Overall request timeout enforced by the transport.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub request_timeout: Duration,
    /// Private admin endpoint configuration.
    pub admin: AdminConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: None,
            request_timeout: Duration::from_secs(600),
            admin: AdminConfig::default(),
        }
    }
}

/// The optional private admin port (config dump, log level).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdminConfig {
    /// Whether the admin endpoints are exposed at all.
    pub enabled: bool,
    /// The socket address the admin router binds to.
    pub listen_address: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_timeout_accepts_human_durations() {
        let config: ServerConfig = serde_yaml::from_str("request_timeout: 2m\n").unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(120));
    }
}
