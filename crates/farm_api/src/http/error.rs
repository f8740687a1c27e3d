use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::domain::{DomainError, ErrorKind};
use serde::Serialize;
use tracing::{error, warn};

/// Fixed message for every denied or unknown resource, so callers cannot
/// discover requests they are not part of
pub const FORBIDDEN_MESSAGE: &str = "forbidden";

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Transport wrapper that turns a DomainError into an HTTP response
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        ApiError(error)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Map a domain error onto status, machine code and client-facing message
pub fn domain_error_to_response(error: &DomainError) -> (StatusCode, &'static str, String) {
    match error.kind() {
        ErrorKind::Validation => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "VALIDATION_ERROR",
            error.to_string(),
        ),
        ErrorKind::Conflict => (StatusCode::CONFLICT, "CONFLICT", error.to_string()),
        ErrorKind::Unauthorized | ErrorKind::NotFound => (
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            FORBIDDEN_MESSAGE.to_string(),
        ),
        ErrorKind::Unauthenticated => (
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
            "missing or invalid bearer token".to_string(),
        ),
        ErrorKind::Storage => (
            StatusCode::BAD_GATEWAY,
            "STORAGE_FAILURE",
            "attachment storage is unavailable".to_string(),
        ),
        ErrorKind::Internal => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "internal error".to_string(),
        ),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = domain_error_to_response(&self.0);

        match self.0.kind() {
            ErrorKind::Internal | ErrorKind::Storage => error!(error = %self.0, "request failed"),
            ErrorKind::Unauthorized | ErrorKind::NotFound | ErrorKind::Unauthenticated => {
                warn!(error = %self.0, "request denied")
            }
            _ => {}
        }

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_and_denied_are_indistinguishable() {
        let denied = domain_error_to_response(&DomainError::PermissionDenied("x".to_string()));
        let missing =
            domain_error_to_response(&DomainError::ServiceRequestNotFound("sr-1".to_string()));
        assert_eq!(denied, missing);
        assert_eq!(denied.0, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_status_codes_by_kind() {
        let cases = [
            (DomainError::EmptyMessage, StatusCode::UNPROCESSABLE_ENTITY),
            (
                DomainError::DeviceAlreadyAssigned("D-100".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                DomainError::InvalidToken("expired".to_string()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                DomainError::StorageFailure("down".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                DomainError::RepositoryError(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(domain_error_to_response(&error).0, expected);
        }
    }

    #[test]
    fn test_internal_detail_is_not_exposed() {
        let (_, _, message) =
            domain_error_to_response(&DomainError::RepositoryError(anyhow::anyhow!("password=x")));
        assert!(!message.contains("password"));
    }
}
