use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::messages::anthropic;

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// LLM service errors with appropriate HTTP status codes.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Invalid model format or missing provider/model in request.
    #[error("Invalid model format: expected 'provider/model', got '{0}'")]
    InvalidModelFormat(String),

    /// Provider not found in configuration.
    #[error("Provider '{0}' not found")]
    ProviderNotFound(String),

    /// Model not found at the provider.
    #[error("{0}")]
    ModelNotFound(String),

    /// Authentication failed (missing or invalid API key).
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded { message: String },

    /// Insufficient quota or credits.
    #[error("Insufficient quota: {0}")]
    InsufficientQuota(String),

    /// Streaming not supported.
    #[error("Streaming is not yet supported. Please set stream=false or omit the parameter.")]
    StreamingNotSupported,

    /// Provider API returned an error.
    #[error("Provider API error ({status}): {message}")]
    ProviderApiError { status: u16, message: String },

    /// Network or connection error.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Internal server error.
    /// If Some(message), it came from a provider and can be shown.
    /// If None, it's an internal gateway error and should not leak details.
    #[error("Internal server error")]
    InternalError(Option<String>),

    /// Caller lacks permission for the requested model or provider, distinct
    /// from a missing/invalid credential.
    #[error("Forbidden: {0}")]
    AuthorizationFailed(String),

    /// The upstream call did not complete before its deadline.
    #[error("Request to provider '{provider}' timed out")]
    Timeout { provider: String },

    /// The circuit breaker for this provider is open; the call was never
    /// attempted.
    #[error("Circuit open for provider '{provider}'")]
    CircuitOpen { provider: String },

    /// A configured spend or token budget would be exceeded by this request.
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// The model router could not be reached and the request carried no
    /// explicit model to fall back to.
    #[error("No candidate provider/model available: {0}")]
    NoCandidate(String),
}

impl LlmError {
    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidModelFormat(_) | Self::InvalidRequest(_) | Self::StreamingNotSupported => {
                StatusCode::BAD_REQUEST
            }
            Self::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientQuota(_) => StatusCode::FORBIDDEN,
            Self::ProviderNotFound(_) | Self::ModelNotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ConnectionError(_) => StatusCode::BAD_GATEWAY,
            Self::ProviderApiError { status, .. } => {
                // Map provider status codes to our status codes
                match *status {
                    400 => StatusCode::BAD_REQUEST,
                    401 => StatusCode::UNAUTHORIZED,
                    403 => StatusCode::FORBIDDEN,
                    404 => StatusCode::NOT_FOUND,
                    429 => StatusCode::TOO_MANY_REQUESTS,
                    500..=599 => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::BAD_GATEWAY,
                }
            }
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AuthorizationFailed(_) => StatusCode::FORBIDDEN,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::BudgetExceeded(_) => StatusCode::PAYMENT_REQUIRED,
            Self::NoCandidate(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Get the error type string for the response.
    pub fn error_type(&self) -> &str {
        match self {
            Self::InvalidModelFormat(_) | Self::InvalidRequest(_) | Self::StreamingNotSupported => {
                "invalid_request_error"
            }
            Self::AuthenticationFailed(_) => "authentication_error",
            Self::AuthorizationFailed(_) => "permission_error",
            Self::InsufficientQuota(_) => "insufficient_quota",
            Self::ProviderNotFound(_) | Self::ModelNotFound(_) => "not_found_error",
            Self::RateLimitExceeded { .. } => "rate_limit_error",
            Self::ConnectionError(_) | Self::ProviderApiError { .. } => "api_error",
            Self::InternalError(_) => "internal_error",
            Self::Timeout { .. } => "timeout_error",
            Self::CircuitOpen { .. } => "circuit_open_error",
            Self::BudgetExceeded(_) => "budget_exceeded_error",
            Self::NoCandidate(_) => "no_candidate_error",
        }
    }

    /// Message that is safe to expose to API consumers.
    pub fn client_message(&self) -> String {
        match self {
            Self::InternalError(Some(provider_msg)) => provider_msg.clone(),
            Self::InternalError(None) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether the fallback executor should try the next candidate after
    /// this error rather than surfacing it to the caller immediately.
    pub fn retryable(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::Timeout { .. } | Self::CircuitOpen { .. } => true,
            Self::RateLimitExceeded { .. } => true,
            Self::ProviderApiError { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    /// Whether this outcome should count against the provider's circuit
    /// breaker. Non-retryable 4xx responses (other than 408/429) never trip
    /// the breaker: they indicate a bad request, not an unhealthy provider.
    pub fn triggers_breaker(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::Timeout { .. } => true,
            Self::RateLimitExceeded { .. } => true,
            Self::ProviderApiError { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

/// Error response format compatible with OpenAI API.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    r#type: String,
    code: u16,
}

impl IntoResponse for LlmError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // No Retry-After headers to maintain consistency with downstream LLM providers

        // For internal errors, only show provider messages, not Nexus internals
        let message = self.client_message();

        let error_response = ErrorResponse {
            error: ErrorDetails {
                message,
                r#type: self.error_type().to_string(),
                code: status.as_u16(),
            },
        };

        // Build response without Retry-After headers for consistency with downstream providers
        (status, Json(error_response)).into_response()
    }
}

pub struct AnthropicErrorResponse {
    status: StatusCode,
    body: anthropic::ErrorResponse,
}

impl From<LlmError> for anthropic::AnthropicError {
    fn from(error: LlmError) -> Self {
        anthropic::AnthropicError {
            error_type: "error".to_string(),
            error: anthropic::AnthropicErrorDetails {
                error_type: error.error_type().to_string(),
                message: error.client_message(),
            },
        }
    }
}

impl From<LlmError> for AnthropicErrorResponse {
    fn from(error: LlmError) -> Self {
        let status = error.status_code();
        let body = anthropic::ErrorResponse::from(error);

        Self { status, body }
    }
}

impl IntoResponse for AnthropicErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type AnthropicResult<T> = std::result::Result<T, AnthropicErrorResponse>;

/// Error response format compatible with the Gemini `generateContent` API,
/// which wraps the error in a single-element `error` object rather than
/// OpenAI's flatter shape.
pub struct GeminiErrorResponse {
    status: StatusCode,
    body: GeminiErrorBody,
}

#[derive(Debug, Serialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetails,
}

#[derive(Debug, Serialize)]
struct GeminiErrorDetails {
    code: u16,
    message: String,
    status: String,
}

impl From<LlmError> for GeminiErrorResponse {
    fn from(error: LlmError) -> Self {
        let status = error.status_code();
        let message = error.client_message();

        Self {
            status,
            body: GeminiErrorBody {
                error: GeminiErrorDetails {
                    code: status.as_u16(),
                    message,
                    status: status.canonical_reason().unwrap_or("UNKNOWN").replace(' ', "_").to_uppercase(),
                },
            },
        }
    }
}

impl IntoResponse for GeminiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type GeminiResult<T> = std::result::Result<T, GeminiErrorResponse>;
