//! Antwort server library.
//!
//! Provides a reusable server function to serve Antwort either for the
//! binary, or for integration tests.

#![deny(missing_docs)]

mod admin;
mod auth;
mod error;
mod handlers;
mod health;
mod logger;
mod metrics;
mod rate_limit;
mod request_id;
mod sse;
mod trace;
mod vector_stores;

use std::{net::SocketAddr, sync::Arc};

use anyhow::anyhow;
use axum::{
    Router,
    response::IntoResponse,
    routing::{get, post},
};
use config::{Config, StorageConfig};
use engine::Engine;
use storage::{MemoryStore, PostgresStore, ResponseStore};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};

use crate::error::ApiError;

/// Configuration for serving Antwort.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized configuration.
    pub config: Config,
    /// Cancellation token for graceful shutdown
    pub shutdown_signal: CancellationToken,
    /// Log filter string (e.g., "info" or "server=debug,llm=debug")
    pub log_filter: String,
    /// The version string to log on startup
    pub version: String,
    /// Optional oneshot sender to send back the bound address (useful if port 0 was specified)
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the Antwort server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        log_filter,
        version,
        bound_addr_sender,
    }: ServeConfig,
) -> anyhow::Result<()> {
    logger::init(&log_filter);

    log::info!("Antwort {version}");

    config.validate()?;

    let store = build_store(&config).await?;
    let engine = Engine::from_config(&config, store.clone());

    let app = router(&config, engine, store);

    if config.server.admin.enabled {
        match config.server.admin.listen_address {
            Some(admin_address) => {
                let admin_router = admin::router(Arc::new(config.clone()));

                tokio::spawn(async move {
                    match TcpListener::bind(admin_address).await {
                        Ok(listener) => {
                            log::info!("Admin endpoint: http://{admin_address}/admin");

                            if let Err(e) = axum::serve(listener, admin_router).await {
                                log::error!("admin server failed: {e}");
                            }
                        }
                        Err(e) => log::error!("failed to bind admin endpoint {admin_address}: {e}"),
                    }
                });
            }
            None => log::warn!("admin endpoints enabled but no admin listen_address configured"),
        }
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    if let Some(sender) = bound_addr_sender {
        sender
            .send(listener.local_addr()?)
            .expect("Failed to send back bound address.");
    }

    log::info!("OpenResponses endpoint: http://{listen_address}/v1/responses");

    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            result.map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;
        }
        _ = shutdown_signal.cancelled() => {
            log::info!("Received shutdown signal, shutting down gracefully...");
        }
    }

    Ok(())
}

async fn build_store(config: &Config) -> anyhow::Result<Option<Arc<dyn ResponseStore>>> {
    match &config.storage {
        StorageConfig::Memory(memory) => {
            log::debug!("using the in-memory response store");
            Ok(Some(Arc::new(MemoryStore::new(memory))))
        }
        StorageConfig::Postgres(postgres) => {
            log::debug!("connecting to the postgres response store");

            let store = PostgresStore::connect(postgres)
                .await
                .map_err(|e| anyhow!("failed to initialize postgres storage: {e}"))?;

            Ok(Some(Arc::new(store)))
        }
    }
}

/// Build the full application router with the fixed middleware chain:
/// recovery → request-id → logging → auth → rate-limit → metrics.
pub fn router(config: &Config, engine: Engine, store: Option<Arc<dyn ResponseStore>>) -> Router {
    let metrics = metrics::Metrics::new();
    let auth_layer = auth::AuthLayer::new(auth::AuthChain::from_config(&config.auth));
    let rate_limit_state = rate_limit::RateLimitState::new(&config.rate_limits);

    let state = handlers::AppState {
        engine,
        store: store.clone(),
    };

    let health_state = health::HealthState {
        store,
        has_providers: config.llm.has_providers(),
    };

    let api = Router::new()
        .route(
            "/v1/responses",
            post(handlers::create_response).get(handlers::list_responses),
        )
        .route(
            "/v1/responses/{id}",
            get(handlers::get_response).delete(handlers::delete_response),
        )
        .route("/v1/responses/{id}/input_items", get(handlers::list_input_items))
        .route("/v1/models", get(handlers::list_models))
        .with_state(state);

    let probes = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .with_state(health_state);

    let metrics_router = Router::new()
        .route("/metrics", get(metrics::handler))
        .with_state(metrics.clone());

    let app = api
        .merge(vector_stores::router())
        .merge(probes)
        .merge(metrics_router);

    let app = app
        .layer(TimeoutLayer::new(config.server.request_timeout))
        .layer(axum::middleware::from_fn_with_state(metrics, metrics::middleware));

    let app = match rate_limit_state {
        Some(state) => app.layer(axum::middleware::from_fn_with_state(state, rate_limit::middleware)),
        None => app,
    };

    app.layer(auth_layer)
        .layer(axum::middleware::from_fn(trace::middleware))
        .layer(axum::middleware::from_fn(request_id::middleware))
        .layer(CatchPanicLayer::custom(recover))
}

fn recover(_: Box<dyn std::any::Any + Send + 'static>) -> http::Response<axum::body::Body> {
    log::error!("request handler panicked");
    ApiError(protocol::Error::server_error("internal server error")).into_response()
}
