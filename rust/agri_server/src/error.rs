use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use common::ErrorResponse;
use thiserror::Error;

use crate::inference::InferenceError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<InferenceError> for AppError {
    fn from(err: InferenceError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

/// Failures while staging an upload are reported as client errors.
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::BadRequest(format!("Failed to store upload: {}", err))
    }
}

/// A panicking collaborator is reported like any other inference failure.
impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::BadRequest(format!("Inference task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_failures_are_client_errors() {
        let err: AppError = InferenceError::Image("unsupported format".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid image: unsupported format");
    }

    #[test]
    fn io_failures_are_client_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AppError = io.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("denied"));
    }

    #[tokio::test]
    async fn panicked_task_is_a_client_error() {
        let join_err = tokio::spawn(async { panic!("model crashed") })
            .await
            .unwrap_err();
        let response = AppError::from(join_err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
