use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable classification of a failure, independent of the transport that
/// reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Invalid,
    RateLimited,
    Timeout,
    NotFound,
    Conflict,
    PayloadTooLarge,
    /// Backpressure: the request may succeed if retried later.
    Unavailable,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Invalid => "invalid",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorKind::Invalid => StatusCode::BAD_REQUEST,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Canonical gRPC status name used by a gRPC adapter for this kind.
    pub fn grpc_code(&self) -> &'static str {
        match self {
            ErrorKind::Invalid => "INVALID_ARGUMENT",
            ErrorKind::RateLimited => "RESOURCE_EXHAUSTED",
            ErrorKind::Timeout => "DEADLINE_EXCEEDED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "ALREADY_EXISTS",
            ErrorKind::PayloadTooLarge => "RESOURCE_EXHAUSTED",
            ErrorKind::Unavailable => "UNAVAILABLE",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        GatewayError::Invalid(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        GatewayError::RateLimited(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        GatewayError::Timeout(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        GatewayError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        GatewayError::Conflict(msg.into())
    }

    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        GatewayError::PayloadTooLarge(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        GatewayError::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        GatewayError::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Invalid(_) => ErrorKind::Invalid,
            GatewayError::RateLimited(_) => ErrorKind::RateLimited,
            GatewayError::Timeout(_) => ErrorKind::Timeout,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::Conflict(_) => ErrorKind::Conflict,
            GatewayError::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            GatewayError::Unavailable(_) => ErrorKind::Unavailable,
            GatewayError::Internal(_) | GatewayError::Configuration(_) => ErrorKind::Internal,
        }
    }

    /// Classifies an arbitrary error. Anything that is not already a
    /// `GatewayError` is reported as `Internal`.
    pub fn classify(err: &(dyn std::error::Error + 'static)) -> Self {
        match err.downcast_ref::<GatewayError>() {
            Some(gateway_err) => gateway_err.clone(),
            None => GatewayError::Internal(err.to_string()),
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

impl From<envconfig::Error> for GatewayError {
    fn from(err: envconfig::Error) -> Self {
        GatewayError::Configuration(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_gateway_error(err: &GatewayError) -> Self {
        let kind = err.kind();
        let message = match err {
            // Internal details stay in the logs.
            GatewayError::Internal(_) | GatewayError::Configuration(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        Self::new(kind.as_str(), &message, kind.http_status().as_u16())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        if kind == ErrorKind::Internal {
            tracing::error!(error = %self, "request failed with internal error");
        }
        (kind.http_status(), Json(ErrorResponse::from_gateway_error(&self))).into_response()
    }
}
