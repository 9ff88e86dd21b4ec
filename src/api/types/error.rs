//! API error envelope
//!
//! Every error body has the shape `{"error": {"code", "docs", "message"}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::api::middleware::current_request_id;
use crate::domain::DomainError;

const DOCS_BASE_URL: &str = "https://keygate.dev/docs/api-reference/errors/code";

/// Machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    DeleteProtected,
    RateLimited,
    InternalServerError,
}

impl ApiErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::DeleteProtected => "DELETE_PROTECTED",
            Self::RateLimited => "RATE_LIMITED",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::DeleteProtected => StatusCode::PRECONDITION_FAILED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn docs_url(&self) -> String {
        format!("{}/{}", DOCS_BASE_URL, self.as_str())
    }
}

impl std::fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: ApiErrorCode,
    pub docs: String,
    pub message: String,
}

/// API error with status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ApiErrorResponse,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status(),
            response: ApiErrorResponse {
                error: ApiErrorDetail {
                    code,
                    docs: code.docs_url(),
                    message: message.into(),
                },
            },
        }
    }

    pub fn code(&self) -> ApiErrorCode {
        self.response.error.code
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::NotFound, message)
    }

    /// Opaque internal error; the detail is logged under the request's correlation id
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        let request_id = current_request_id();
        error!(request_id = %request_id, "Internal error: {}", detail);

        Self::new(
            ApiErrorCode::InternalServerError,
            format!(
                "An internal error occurred. Please contact support with request id {}",
                request_id
            ),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { message } => Self::not_found(message),
            DomainError::Validation { message } | DomainError::InvalidId { message } => {
                Self::bad_request(message)
            }
            DomainError::Unauthorized { message } => Self::unauthorized(message),
            DomainError::Forbidden { message } => Self::forbidden(message),
            DomainError::DeleteProtected { message } => {
                Self::new(ApiErrorCode::DeleteProtected, message)
            }
            DomainError::Conflict { message } => Self::new(ApiErrorCode::Conflict, message),
            err @ (DomainError::Configuration { .. }
            | DomainError::Internal { .. }
            | DomainError::Storage { .. }) => Self::internal(err),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.response.error.code, self.response.error.message
        )
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_per_code() {
        let cases = [
            (ApiErrorCode::BadRequest, 400),
            (ApiErrorCode::Unauthorized, 401),
            (ApiErrorCode::Forbidden, 403),
            (ApiErrorCode::NotFound, 404),
            (ApiErrorCode::Conflict, 409),
            (ApiErrorCode::DeleteProtected, 412),
            (ApiErrorCode::RateLimited, 429),
            (ApiErrorCode::InternalServerError, 500),
        ];

        for (code, status) in cases {
            assert_eq!(code.status().as_u16(), status, "{}", code);
        }
    }

    #[test]
    fn test_error_body_shape() {
        let err = ApiError::forbidden("Missing one of these permissions: *");
        let json = serde_json::to_value(&err.response).unwrap();

        assert_eq!(json["error"]["code"], "FORBIDDEN");
        assert_eq!(
            json["error"]["docs"],
            "https://keygate.dev/docs/api-reference/errors/code/FORBIDDEN"
        );
        assert_eq!(json["error"]["message"], "Missing one of these permissions: *");
    }

    #[test]
    fn test_domain_error_conversion() {
        let cases = [
            (DomainError::not_found("x"), ApiErrorCode::NotFound),
            (DomainError::validation("x"), ApiErrorCode::BadRequest),
            (DomainError::invalid_id("x"), ApiErrorCode::BadRequest),
            (DomainError::unauthorized("x"), ApiErrorCode::Unauthorized),
            (DomainError::forbidden("x"), ApiErrorCode::Forbidden),
            (DomainError::delete_protected("x"), ApiErrorCode::DeleteProtected),
            (DomainError::conflict("x"), ApiErrorCode::Conflict),
            (DomainError::storage("x"), ApiErrorCode::InternalServerError),
        ];

        for (domain, code) in cases {
            assert_eq!(ApiError::from(domain).code(), code);
        }
    }

    #[test]
    fn test_internal_error_is_opaque() {
        let err = ApiError::from(DomainError::storage("connection refused to 10.0.0.3"));

        assert!(!err.response.error.message.contains("10.0.0.3"));
        assert!(err.response.error.message.contains("req_"));
    }
}
