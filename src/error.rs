use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::domain::DomainError;
use crate::models::ApiResponse;

/// Client-observable error taxonomy. Every handler returns
/// `Result<HttpResponse, ServiceError>` so failures always reach the client
/// as an `ApiResponse` envelope with a human-readable message.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    StateConflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(format!("Validation failed: {err}"))
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::VerificationRequired
            | DomainError::VerificationStatusUnknown
            | DomainError::NotCounterparty
            | DomainError::ConnectionBlocked => Self::Authorization(err.to_string()),
            DomainError::MissingReason | DomainError::MissingRequiredField(_) => {
                Self::Validation(err.to_string())
            }
            DomainError::AlreadyUnderReview
            | DomainError::AlreadyVerified
            | DomainError::NotAwaitingReview
            | DomainError::InvalidListingTransition { .. }
            | DomainError::ListingNotPublished
            | DomainError::DuplicateConnection
            | DomainError::AlreadyResolved
            | DomainError::MessagingLocked => Self::StateConflict(err.to_string()),
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::StateConflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            // Internal details stay in the logs, not the response body.
            Self::Database(err) => {
                log::error!("Database error: {err:?}");
                if matches!(err, sqlx::Error::RowNotFound) {
                    "Not found".to_string()
                } else {
                    "Internal server error".to_string()
                }
            }
            Self::Internal(msg) => {
                log::error!("Internal error: {msg}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::error(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_the_right_status() {
        let cases = [
            (
                ServiceError::from(DomainError::NotCounterparty),
                StatusCode::FORBIDDEN,
            ),
            (
                ServiceError::from(DomainError::AlreadyResolved),
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::from(DomainError::MissingReason),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::from(DomainError::VerificationRequired),
                StatusCode::FORBIDDEN,
            ),
            (
                ServiceError::from(DomainError::DuplicateConnection),
                StatusCode::CONFLICT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }

    #[test]
    fn row_not_found_surfaces_as_404() {
        let err = ServiceError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
