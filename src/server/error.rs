use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::aqi::PipelineError;
use crate::llm::LlmError;

/// Error type returned by handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Machine-readable error class in the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authorization,
    UpstreamLlm,
    UpstreamFeed,
    MalformedResponse,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    fn parts(&self) -> (StatusCode, ErrorKind, String, Option<String>) {
        let AppError::Pipeline(err) = self;
        match err {
            PipelineError::Llm(LlmError::MissingApiKey) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Authorization,
                "Gemini API key is not configured".to_string(),
                Some(err.to_string()),
            ),
            PipelineError::Llm(e @ LlmError::Unauthorized(_)) => (
                StatusCode::BAD_GATEWAY,
                ErrorKind::Authorization,
                "Gemini rejected the API key".to_string(),
                Some(e.to_string()),
            ),
            PipelineError::Llm(e) => (
                StatusCode::BAD_GATEWAY,
                ErrorKind::UpstreamLlm,
                "Language model request failed".to_string(),
                Some(e.to_string()),
            ),
            PipelineError::AllFeedsFailed(statuses) => {
                let causes = statuses
                    .iter()
                    .map(|s| {
                        format!(
                            "{}: {}",
                            s.url,
                            s.error.as_deref().unwrap_or("unknown error")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorKind::UpstreamFeed,
                    err.to_string(),
                    Some(causes),
                )
            }
            PipelineError::NoSummaries => (
                StatusCode::BAD_GATEWAY,
                ErrorKind::UpstreamFeed,
                err.to_string(),
                None,
            ),
            PipelineError::Response { raw, source } => (
                StatusCode::BAD_GATEWAY,
                ErrorKind::MalformedResponse,
                format!("Malformed model response: {}", source),
                Some(raw.clone()),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, error, details) = self.parts();

        if status.is_server_error() {
            tracing::error!(status = %status, kind = ?kind, error = %self, "Request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error,
                kind,
                details,
            }),
        )
            .into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
