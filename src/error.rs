use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Insufficient credits: balance {balance}, cost {cost}")]
    InsufficientCredits { balance: i64, cost: i64 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InsufficientCredits { balance, cost } => {
                let body = json!({
                    "error": "insufficient_credits",
                    "message": format!(
                        "Unlocking costs {} credits but you only have {}. Check in daily to earn more.",
                        cost, balance
                    ),
                    "balance": balance,
                    "cost": cost,
                });
                return (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response();
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Maps `QueryReturnedNoRows` to `NotFound`, leaving other errors alone.
pub trait OptionalRow<T> {
    fn or_not_found(self) -> AppResult<T>;
}

impl<T> OptionalRow<T> for Result<T, rusqlite::Error> {
    fn or_not_found(self) -> AppResult<T> {
        match self {
            Ok(value) => Ok(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(AppError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn response_status(err: AppError) -> StatusCode {
        let response = err.into_response();
        response.status()
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(response_status(AppError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthorized_returns_401() {
        assert_eq!(
            response_status(AppError::Unauthorized),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn forbidden_returns_403() {
        assert_eq!(response_status(AppError::Forbidden), StatusCode::FORBIDDEN);
    }

    #[test]
    fn bad_request_returns_400() {
        assert_eq!(
            response_status(AppError::BadRequest("oops".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn insufficient_credits_returns_402() {
        assert_eq!(
            response_status(AppError::InsufficientCredits {
                balance: 10,
                cost: 100
            }),
            StatusCode::PAYMENT_REQUIRED
        );
    }

    #[test]
    fn internal_returns_500() {
        assert_eq!(
            response_status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_row_becomes_not_found() {
        let missing: Result<i64, rusqlite::Error> = Err(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(missing.or_not_found(), Err(AppError::NotFound)));

        let other: Result<i64, rusqlite::Error> = Err(rusqlite::Error::InvalidQuery);
        assert!(matches!(other.or_not_found(), Err(AppError::Database(_))));
    }
}
