use http::StatusCode;
use thiserror::Error;

/// HTTP result type, T is typically a hyper::Response
/// HttpError is used to generate a synthetic error response
pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// Describes things that can go wrong while handling an exchange.
///
/// Policy interrupts are not errors; they produce a regular response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("No matching route")]
    NoMatchingRoute,

    #[error("Failed to get response from backend: {0}")]
    FailedToGetResponseFromBackend(String),

    #[error("Failed to generate downstream response: {0}")]
    FailedToGenerateDownstreamResponse(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),
}

impl HttpError {
    /// Label used for the `error_type` metric attribute
    pub fn error_type(&self) -> &'static str {
        match self {
            HttpError::NoMatchingRoute => "no_matching_route",
            HttpError::FailedToGetResponseFromBackend(_) => "backend_error",
            HttpError::FailedToGenerateDownstreamResponse(_) => "downstream_response_failed",
            HttpError::InvalidUri(_) => "invalid_uri",
        }
    }
}

impl From<HttpError> for StatusCode {
    fn from(e: HttpError) -> StatusCode {
        match e {
            HttpError::NoMatchingRoute => StatusCode::NOT_FOUND,
            HttpError::FailedToGetResponseFromBackend(_) => StatusCode::BAD_GATEWAY,
            HttpError::FailedToGenerateDownstreamResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::InvalidUri(_) => StatusCode::BAD_REQUEST,
        }
    }
}
