//! Wire error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use protocol::{Error, ErrorBody, ErrorKind};

/// Axum-facing wrapper around the protocol error, carrying the HTTP status
/// mapping.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError(error)
    }
}

impl From<storage::StoreError> for ApiError {
    fn from(error: storage::StoreError) -> Self {
        ApiError(error.into())
    }
}

/// The HTTP status for an error kind. Forbidden deliberately maps to 404:
/// cross-tenant probes must not learn whether a resource exists.
pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound | ErrorKind::Forbidden => StatusCode::NOT_FOUND,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::ModelError => StatusCode::BAD_GATEWAY,
        ErrorKind::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind);
        (status, Json(ErrorBody::from(self.0))).into_response()
    }
}
