//! Request logging middleware.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

use crate::request_id::RequestId;

pub(crate) async fn middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed();

    let status = response.status().as_u16();

    if response.status().is_server_error() {
        log::error!("{method} {path} -> {status} in {elapsed:?} [{request_id}]");
    } else {
        log::debug!("{method} {path} -> {status} in {elapsed:?} [{request_id}]");
    }

    response
}
