use crate::nav_client::GatewayError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Ledger or user store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// NAV provider errors
    #[error("Pricing gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Validation errors
    #[error("{0}")]
    Validation(String),

    /// Not found errors
    #[error("{0}")]
    NotFound(String),

    /// Unauthorized access errors
    #[error("{0}")]
    Unauthorized(String),

    /// Concurrent modification that could not be reconciled
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Message(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Check if error is a lost or exhausted database connection
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AppError::Store(StoreError::Query(
                SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_)
            ))
        )
    }

    /// Errors worth retrying on a later attempt (provider hiccups, lost connections)
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Gateway(e) => e.is_retryable(),
            AppError::Conflict(_) => true,
            _ => self.is_connection_error(),
        }
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::NotFound(_) => 404,
            AppError::Unauthorized(_) => 401,
            AppError::Validation(_) => 400,
            AppError::Store(StoreError::Duplicate(_)) => 400,
            AppError::Store(StoreError::NotFound(_)) => 404,
            AppError::Conflict(_) => 409,
            AppError::Store(_) => 500,
            AppError::Gateway(_) => 502,
            _ => 500,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    code: u16,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(ErrorBody {
            status: "error",
            code: status.as_u16(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

/// Store-specific error types
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Duplicate record
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Stored record does not map onto a valid domain type
    #[error("Malformed record: {0}")]
    Mapping(String),
}

impl From<SqlxError> for StoreError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => StoreError::NotFound("Record not found".to_string()),
            SqlxError::ColumnDecode { .. } | SqlxError::ColumnNotFound(_) => {
                StoreError::Mapping(err.to_string())
            }
            SqlxError::Database(db_err) => {
                // Check for common PostgreSQL error codes
                let code = db_err.code().map(|c| c.to_string());
                if code.as_deref() == Some("23505") {
                    // Unique violation
                    StoreError::Duplicate(db_err.message().to_string())
                } else if matches!(code.as_deref(), Some("23503") | Some("23514") | Some("22003")) {
                    // Foreign key, check constraint or numeric range violation
                    StoreError::ConstraintViolation(db_err.message().to_string())
                } else {
                    StoreError::Query(err)
                }
            }
            _ => StoreError::Query(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Validation("bad".into()).status_code(), 400);
        assert_eq!(AppError::Unauthorized("no".into()).status_code(), 401);
        assert_eq!(AppError::NotFound("gone".into()).status_code(), 404);
        assert_eq!(AppError::Conflict("race".into()).status_code(), 409);
        assert_eq!(
            AppError::Store(StoreError::Duplicate("email".into())).status_code(),
            400
        );
        assert_eq!(
            AppError::Store(StoreError::Mapping("units".into())).status_code(),
            500
        );
        assert_eq!(
            AppError::Gateway(GatewayError::Status(503)).status_code(),
            502
        );
    }

    #[test]
    fn test_validation_message_is_surfaced_verbatim() {
        let err = AppError::Validation("Units must be greater than 0.".into());
        assert_eq!(err.to_string(), "Units must be greater than 0.");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::Gateway(GatewayError::Status(503)).is_retryable());
        assert!(!AppError::Gateway(GatewayError::SchemeNotFound(100)).is_retryable());
        assert!(!AppError::Validation("bad".into()).is_retryable());
        assert!(AppError::Store(StoreError::Query(SqlxError::PoolTimedOut)).is_retryable());
        assert!(!AppError::Store(StoreError::Duplicate("email".into())).is_retryable());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: StoreError = SqlxError::RowNotFound.into();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
