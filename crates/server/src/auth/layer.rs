//! Tower layer running the authenticator chain.
//!
//! `/healthz`, `/readyz` and `/metrics` bypass the chain entirely; the
//! endpoint check happens before any credential is even looked at.

use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{body::Body, response::IntoResponse};
use context::RequestContext;
use http::{Request, Response};
use tower::Layer;

use crate::{error::ApiError, request_id::RequestId};

use super::AuthChain;

const BYPASS_PATHS: &[&str] = &["/healthz", "/readyz", "/metrics"];

#[derive(Clone)]
pub(crate) struct AuthLayer(Arc<AuthChain>);

impl AuthLayer {
    pub fn new(chain: AuthChain) -> Self {
        Self(Arc::new(chain))
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, next: S) -> Self::Service {
        AuthService {
            next,
            chain: self.0.clone(),
        }
    }
}

pub(crate) struct AuthService<S> {
    next: S,
    chain: Arc<AuthChain>,
}

impl<S: Clone> Clone for AuthService<S> {
    fn clone(&self) -> Self {
        AuthService {
            next: self.next.clone(),
            chain: self.chain.clone(),
        }
    }
}

impl<S, ReqBody> tower::Service<Request<ReqBody>> for AuthService<S>
where
    S: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    S::Future: Send,
    S::Error: Display + 'static,
    ReqBody: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let chain = self.chain.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            if BYPASS_PATHS.contains(&parts.uri.path()) {
                return next.call(Request::from_parts(parts, body)).await;
            }

            match chain.resolve(&parts).await {
                Ok(identity) => {
                    let request_id = parts
                        .extensions
                        .get::<RequestId>()
                        .map(|id| id.0.clone())
                        .unwrap_or_default();

                    parts.extensions.insert(RequestContext { request_id, identity });

                    next.call(Request::from_parts(parts, body)).await
                }
                Err(err) => Ok(ApiError(err).into_response()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, routing::get};
    use http::StatusCode;
    use tower::ServiceExt;

    use crate::auth::AuthChain;

    use super::*;

    fn protected_router() -> Router {
        let config: config::AuthConfig = serde_yaml::from_str(indoc::indoc! {r#"
            api_keys:
              - key: "sk-valid"
                subject: tester
        "#})
        .unwrap();

        Router::new()
            .route("/v1/responses", get(async || "ok"))
            .route("/healthz", get(async || "alive"))
            .route("/metrics", get(async || "metrics"))
            .layer(AuthLayer::new(AuthChain::from_config(&config)))
    }

    async fn get_status(router: Router, path: &str, auth: Option<&str>) -> StatusCode {
        let mut builder = http::Request::builder().uri(path);

        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }

        let response = router.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        response.status()
    }

    #[tokio::test]
    async fn protected_route_requires_credentials() {
        assert_eq!(
            get_status(protected_router(), "/v1/responses", None).await,
            StatusCode::UNAUTHORIZED
        );

        assert_eq!(
            get_status(protected_router(), "/v1/responses", Some("Bearer sk-valid")).await,
            StatusCode::OK
        );

        assert_eq!(
            get_status(protected_router(), "/v1/responses", Some("Bearer nope")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn bypass_endpoints_skip_the_chain() {
        // No credentials at all.
        assert_eq!(get_status(protected_router(), "/healthz", None).await, StatusCode::OK);
        assert_eq!(get_status(protected_router(), "/metrics", None).await, StatusCode::OK);

        // Even garbage credentials are never inspected.
        assert_eq!(
            get_status(protected_router(), "/healthz", Some("Bearer garbage")).await,
            StatusCode::OK
        );
    }
}
