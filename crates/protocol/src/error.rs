use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

/// Error classification, shared between HTTP responses and stream events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Request validation failed; `param` names the offending parameter.
    InvalidRequest,
    /// The referenced resource does not exist for this tenant.
    NotFound,
    /// Missing or invalid credentials.
    Unauthenticated,
    /// Authenticated but lacking the required scope.
    Forbidden,
    /// Rate limit exceeded.
    TooManyRequests,
    /// The upstream inference backend failed.
    ModelError,
    /// Unexpected internal failure.
    ServerError,
}

/// The wire error payload: `{"type", "code"?, "param"?, "message"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            param: None,
            message: message.into(),
        }
    }

    /// A validation failure naming the offending parameter.
    pub fn invalid_request(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidRequest,
            code: None,
            param: Some(param.into()),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TooManyRequests, message)
    }

    pub fn model_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelError, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerError, message)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// The `{"error": {...}}` wrapper used by every non-streaming error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: Error,
}

impl From<Error> for ErrorBody {
    fn from(error: Error) -> Self {
        Self { error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_omits_empty_fields() {
        let body = ErrorBody::from(Error::not_found("response not found"));
        let json = serde_json::to_value(&body).unwrap();

        insta::assert_json_snapshot!(json, @r#"
        {
          "error": {
            "type": "not_found",
            "message": "response not found"
          }
        }
        "#);
    }

    #[test]
    fn param_round_trips() {
        let err = Error::invalid_request("previous_response_id", "unknown response");
        let json = serde_json::to_string(&err).unwrap();
        let back: Error = serde_json::from_str(&json).unwrap();

        assert_eq!(back, err);
    }
}
