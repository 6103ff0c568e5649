//! Request-id middleware: honor `x-request-id` or generate one, expose it as
//! an extension and echo it on the response.

use axum::{extract::Request, middleware::Next, response::Response};
use http::HeaderValue;

pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";

/// The correlation id assigned to the current request.
#[derive(Debug, Clone)]
pub(crate) struct RequestId(pub String);

pub(crate) async fn middleware(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, routing::get};
    use tower::ServiceExt;

    use super::*;

    fn router() -> Router {
        Router::new()
            .route("/", get(async || "ok"))
            .layer(axum::middleware::from_fn(middleware))
    }

    #[tokio::test]
    async fn honors_incoming_header() {
        let response = router()
            .oneshot(
                http::Request::builder()
                    .uri("/")
                    .header(REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-42");
    }

    #[tokio::test]
    async fn generates_when_absent() {
        let response = router()
            .oneshot(http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(!response.headers()[REQUEST_ID_HEADER].is_empty());
    }
}
