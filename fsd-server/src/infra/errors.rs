use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use fsd_core::FsdError;

use super::response::ApiResponse;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 404 with an empty body.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, String::new())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status == StatusCode::NOT_FOUND {
            return self.status.into_response();
        }
        ApiResponse::error(self.status, self.message).into_response()
    }
}

impl From<FsdError> for AppError {
    fn from(err: FsdError) -> Self {
        match err {
            FsdError::InvalidProc(msg) => Self::bad_request(msg),
            FsdError::Database(err) => err.into(),
            other => {
                tracing::error!(error = %other, "request failed");
                Self::internal("internal error")
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = ?err, "database operation failed");
        Self::internal("Database operation failed")
    }
}
