//! The private admin surface: config dump and runtime log level.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;

pub(crate) fn router(config: Arc<config::Config>) -> Router {
    Router::new()
        .route("/admin/config", get(dump_config))
        .route("/admin/log-level", post(set_log_level))
        .with_state(config)
}

/// Dump the effective configuration. Secrets render as `SecretString(REDACTED)`
/// through their Debug impl, so the dump is safe to read back.
async fn dump_config(State(config): State<Arc<config::Config>>) -> Response {
    format!("{config:#?}\n").into_response()
}

#[derive(Debug, Deserialize)]
struct LogLevel {
    level: String,
}

async fn set_log_level(Json(request): Json<LogLevel>) -> Response {
    let level = match request.level.to_ascii_lowercase().as_str() {
        "off" => log::LevelFilter::Off,
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        other => {
            return (
                StatusCode::BAD_REQUEST,
                format!("unknown log level `{other}`\n"),
            )
                .into_response();
        }
    };

    log::set_max_level(level);
    log::info!("log level set to {level}");

    StatusCode::NO_CONTENT.into_response()
}
