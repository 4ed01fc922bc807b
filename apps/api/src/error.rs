//! # API Error Responses
//!
//! Maps domain errors onto HTTP statuses:
//!
//! ```text
//! CoreError (validation)          ──► 422 + message naming the sku
//! DbError::NotFound               ──► 404
//! Malformed request               ──► 422
//! Everything else                 ──► 500 (detail logged, not leaked)
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use meridian_core::CoreError;
use meridian_db::{DbError, OrderError};

#[derive(Debug)]
pub enum ApiError {
    /// Client-correctable checkout rejection.
    Validation(CoreError),
    /// Requested entity does not exist.
    NotFound(String),
    /// The request itself is malformed (bad idempotency key, bad payload).
    Unprocessable(String),
    /// Infrastructure failure; detail stays in the logs.
    Internal(String),
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(core) => ApiError::Validation(core),
            OrderError::Db(DbError::NotFound { entity, id }) => {
                ApiError::NotFound(format!("{entity} not found: {id}"))
            }
            OrderError::Db(db) => ApiError::Internal(db.to_string()),
            OrderError::Slip(slip) => ApiError::Internal(slip.to_string()),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{entity} not found: {id}"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(core) => (StatusCode::UNPROCESSABLE_ENTITY, core.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Internal(detail) => {
                error!(%detail, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_422() {
        let err = ApiError::from(OrderError::Validation(CoreError::EmptyCart));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = ApiError::from(DbError::not_found("Order", 9));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_hides_detail() {
        let err = ApiError::Internal("secret pool state".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
