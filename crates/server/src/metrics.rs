//! Prometheus metrics: a request counter and duration histogram, exposed on
//! `/metrics` in text exposition format.

use std::{sync::Arc, time::Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

pub(crate) struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("antwort_http_requests_total", "HTTP requests by method, path and status"),
            &["method", "path", "status"],
        )
        .expect("valid metric definition");

        let duration = HistogramVec::new(
            prometheus::HistogramOpts::new("antwort_http_request_duration_seconds", "HTTP request duration"),
            &["method", "path"],
        )
        .expect("valid metric definition");

        registry
            .register(Box::new(requests.clone()))
            .expect("metric registers once");
        registry
            .register(Box::new(duration.clone()))
            .expect("metric registers once");

        Arc::new(Self {
            registry,
            requests,
            duration,
        })
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();

        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            log::error!("failed to encode metrics: {e}");
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }
}

pub(crate) async fn middleware(State(metrics): State<Arc<Metrics>>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let start = Instant::now();
    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();

    metrics
        .requests
        .with_label_values(&[method.as_str(), path.as_str(), status.as_str()])
        .inc();
    metrics
        .duration
        .with_label_values(&[method.as_str(), path.as_str()])
        .observe(start.elapsed().as_secs_f64());

    response
}

pub(crate) async fn handler(State(metrics): State<Arc<Metrics>>) -> Response {
    metrics.render().into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition() {
        let metrics = Metrics::new();
        metrics.requests.with_label_values(&["POST", "/v1/responses", "200"]).inc();

        let rendered = metrics.render();
        assert!(rendered.contains("antwort_http_requests_total"));
        assert!(rendered.contains("/v1/responses"));
    }
}
