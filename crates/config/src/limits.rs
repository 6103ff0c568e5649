//! Rate limiting configuration.

use std::time::Duration;

use serde::Deserialize;

/// Rate limiting configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Whether the rate-limit layer is installed at all.
    pub enabled: bool,
    /// Limit applied per client IP.
    pub per_ip: Option<RateLimitRule>,
    /// Limit applied per authenticated subject.
    pub per_subject: Option<RateLimitRule>,
}

/// One token-bucket rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitRule {
    /// Requests allowed per interval.
    pub limit: u32,
    /// The refill interval.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub interval: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn rule_parses() {
        let config: RateLimitConfig = serde_yaml::from_str(indoc! {r#"
            enabled: true
            per_ip:
              limit: 100
              interval: 60s
        "#})
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.per_ip.as_ref().unwrap().limit, 100);
        assert_eq!(config.per_ip.unwrap().interval, Duration::from_secs(60));
    }
}
