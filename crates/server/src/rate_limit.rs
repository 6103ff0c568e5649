//! In-memory request rate limiting.
//!
//! Token buckets keyed per client IP and per authenticated subject. A
//! rejected request surfaces as the standard `too_many_requests` error body;
//! no Retry-After header, matching upstream provider behavior.

use std::{net::SocketAddr, num::NonZeroU32, sync::Arc};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use config::{RateLimitConfig, RateLimitRule};
use context::RequestContext;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
};

use crate::error::ApiError;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

pub(crate) struct RateLimitState {
    per_ip: Option<KeyedLimiter>,
    per_subject: Option<KeyedLimiter>,
}

impl RateLimitState {
    pub fn new(config: &RateLimitConfig) -> Option<Arc<Self>> {
        if !config.enabled {
            return None;
        }

        Some(Arc::new(Self {
            per_ip: config.per_ip.as_ref().and_then(build_limiter),
            per_subject: config.per_subject.as_ref().and_then(build_limiter),
        }))
    }

    fn check(&self, ip: Option<&SocketAddr>, subject: Option<&str>) -> bool {
        if let (Some(limiter), Some(ip)) = (&self.per_ip, ip)
            && limiter.check_key(&ip.ip().to_string()).is_err()
        {
            return false;
        }

        if let (Some(limiter), Some(subject)) = (&self.per_subject, subject)
            && limiter.check_key(&subject.to_string()).is_err()
        {
            return false;
        }

        true
    }
}

fn build_limiter(rule: &RateLimitRule) -> Option<KeyedLimiter> {
    let limit = NonZeroU32::new(rule.limit)?;
    let period = rule.interval.checked_div(rule.limit)?;
    let quota = Quota::with_period(period)?.allow_burst(limit);

    Some(RateLimiter::keyed(quota))
}

pub(crate) async fn middleware(State(state): State<Arc<RateLimitState>>, request: Request, next: Next) -> Response {
    let subject = request
        .extensions()
        .get::<RequestContext>()
        .and_then(|ctx| ctx.identity.as_ref())
        .map(|identity| identity.subject.clone());

    let addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    if !state.check(addr.as_ref(), subject.as_deref()) {
        log::debug!("rate limit exceeded for {addr:?} / {subject:?}");

        return ApiError(protocol::Error::too_many_requests("rate limit exceeded")).into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn limiter_enforces_burst() {
        let rule = RateLimitRule {
            limit: 2,
            interval: Duration::from_secs(60),
        };

        let limiter = build_limiter(&rule).unwrap();

        assert!(limiter.check_key(&"a".to_string()).is_ok());
        assert!(limiter.check_key(&"a".to_string()).is_ok());
        assert!(limiter.check_key(&"a".to_string()).is_err());

        // Other keys have their own bucket.
        assert!(limiter.check_key(&"b".to_string()).is_ok());
    }

    #[test]
    fn disabled_config_builds_no_state() {
        assert!(RateLimitState::new(&RateLimitConfig::default()).is_none());
    }
}
