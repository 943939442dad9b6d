use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use tutor_engine::EngineError;
use tutor_store::StoreError;

/// Error returned by every API handler.
#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    Store(StoreError),
    BadRequest(String),
    Forbidden(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Engine(e) => match e {
                EngineError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                EngineError::GenerationTimeout(_) => StatusCode::REQUEST_TIMEOUT,
                EngineError::GenerationFailure(_) => StatusCode::BAD_GATEWAY,
                EngineError::SummaryRequired { .. } => StatusCode::CONFLICT,
                EngineError::InvalidCurriculum(_) => StatusCode::BAD_REQUEST,
            },
            Self::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Engine(e) => match e {
                EngineError::SessionNotFound(_) => "SESSION_NOT_FOUND",
                EngineError::GenerationTimeout(_) => "GENERATION_TIMEOUT",
                EngineError::GenerationFailure(_) => "GENERATION_FAILURE",
                EngineError::SummaryRequired { .. } => "SUMMARY_REQUIRED",
                EngineError::InvalidCurriculum(_) => "INVALID_CURRICULUM",
            },
            Self::Store(e) if e.is_not_found() => "NOT_FOUND",
            Self::Store(_) => "INTERNAL_ERROR",
            Self::BadRequest(_) => "INVALID_PARAMS",
            Self::Forbidden(_) => "FORBIDDEN",
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Engine(e) => e.to_string(),
            Self::Store(e) => e.to_string(),
            Self::BadRequest(m) | Self::Forbidden(m) => m.clone(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self.message(), "request failed");
        }
        let body = ErrorBody {
            success: false,
            error: ErrorDetail {
                code: self.code(),
                message: self.message(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn engine_errors_map_to_statuses() {
        let cases = [
            (EngineError::SessionNotFound("bob".into()), StatusCode::NOT_FOUND),
            (EngineError::GenerationTimeout(Duration::from_secs(60)), StatusCode::REQUEST_TIMEOUT),
            (EngineError::GenerationFailure("exit 1".into()), StatusCode::BAD_GATEWAY),
            (EngineError::SummaryRequired { topic: "VPC".into() }, StatusCode::CONFLICT),
            (EngineError::InvalidCurriculum("empty".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn store_not_found_is_404() {
        let err = ApiError::from(StoreError::NotFound("session sess_x".into()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err = ApiError::from(StoreError::Database("locked".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn forbidden_keeps_message() {
        let err = ApiError::Forbidden("session belongs to another learner".into());
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "FORBIDDEN: session belongs to another learner");
    }
}
