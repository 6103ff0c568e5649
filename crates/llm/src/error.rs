use protocol::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

/// Provider-layer errors.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider not found in configuration.
    #[error("Provider '{0}' not found")]
    ProviderNotFound(String),

    /// Model not served by the resolved provider.
    #[error("{0}")]
    ModelNotFound(String),

    /// The request needs a capability the backend does not advertise.
    #[error("Backend '{backend}' does not support {capability}")]
    CapabilityUnsupported { backend: String, capability: &'static str },

    /// Authentication against the backend failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backend rate limit exceeded.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Backend API returned an error status.
    #[error("Provider API error ({status}): {message}")]
    ProviderApiError { status: u16, message: String },

    /// Network or connection error.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The call outlived its deadline.
    #[error("Provider call timed out")]
    Timeout,

    /// Internal error. `Some` came from the backend and can be shown.
    #[error("Internal provider error")]
    InternalError(Option<String>),
}

impl LlmError {
    /// Whether a retry can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::ConnectionError(_) | LlmError::Timeout | LlmError::RateLimitExceeded(_) => true,
            LlmError::ProviderApiError { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }

    /// Message that is safe to expose to API consumers.
    pub fn client_message(&self) -> String {
        match self {
            LlmError::InternalError(Some(message)) => message.clone(),
            LlmError::InternalError(None) => "internal provider error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<LlmError> for protocol::Error {
    fn from(err: LlmError) -> Self {
        let kind = match &err {
            LlmError::ProviderNotFound(_) | LlmError::ModelNotFound(_) => ErrorKind::InvalidRequest,
            LlmError::CapabilityUnsupported { .. } | LlmError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            LlmError::AuthenticationFailed(_)
            | LlmError::RateLimitExceeded(_)
            | LlmError::ProviderApiError { .. }
            | LlmError::ConnectionError(_)
            | LlmError::Timeout => ErrorKind::ModelError,
            LlmError::InternalError(_) => ErrorKind::ServerError,
        };

        let message = err.client_message();

        let error = protocol::Error::new(kind, message);

        if matches!(err, LlmError::ProviderNotFound(_) | LlmError::ModelNotFound(_)) {
            protocol::Error {
                param: Some("model".to_string()),
                ..error
            }
        } else {
            error
        }
    }
}

/// Map an upstream HTTP error status to a typed error.
pub(crate) fn status_error(status: u16, message: String) -> LlmError {
    match status {
        400 => LlmError::InvalidRequest(message),
        401 | 403 => LlmError::AuthenticationFailed(message),
        404 => LlmError::ModelNotFound(message),
        429 => LlmError::RateLimitExceeded(message),
        500 => LlmError::InternalError(Some(message)),
        _ => LlmError::ProviderApiError { status, message },
    }
}
