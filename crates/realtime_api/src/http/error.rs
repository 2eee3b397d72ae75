use crate::http::dto::ErrorResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::domain::DomainError;
use tracing::error;

/// Error returned by the HTTP handlers, rendered as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn missing_parameter(param: &str) -> Self {
        Self::bad_request(format!("Mandatory parameter '{}' was not sent", param))
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        let status = match &e {
            DomainError::IntersectionNotFound(_) | DomainError::DeviceNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            DomainError::InvalidDeviceId(_) | DomainError::ValidationError(_) => {
                StatusCode::BAD_REQUEST
            }
            DomainError::CacheUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %e, "request failed");
        }

        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API Error {}: {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_status_mapping() {
        let cases = [
            (
                DomainError::IntersectionNotFound("X".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                DomainError::ValidationError("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                DomainError::InvalidDeviceId("".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                DomainError::CacheUnavailable("down".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                DomainError::RepositoryError(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status, expected);
        }
    }
}
