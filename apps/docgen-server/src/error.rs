//! Error types for the docgen server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docx_engine::PipelineError;
use serde::Serialize;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{message}")]
    InvalidRequest { code: &'static str, message: String },

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Render timeout after {0}ms")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServerError::TemplateNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::RenderError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest { code, .. } => code,
            ServerError::TemplateNotFound(_) => "TEMPLATE_NOT_FOUND",
            ServerError::RenderError(_) => "RENDER_ERROR",
            ServerError::Timeout(_) => "TIMEOUT",
            ServerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::TemplateNotFound(name) => format!("Template '{}' not found", name),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ServerError {
    fn from(err: PipelineError) -> Self {
        let invalid = |code: &'static str, err: &PipelineError| ServerError::InvalidRequest {
            code,
            message: err.to_string(),
        };
        match err {
            PipelineError::MissingPayload => invalid("MISSING_PAYLOAD", &err),
            PipelineError::MalformedJson(_) => invalid("MALFORMED_JSON", &err),
            PipelineError::InvalidPayloadShape(_) => invalid("INVALID_PAYLOAD_SHAPE", &err),
            PipelineError::InvalidTemplateName { .. } => invalid("INVALID_TEMPLATE_NAME", &err),
            PipelineError::TemplateNotFound(name) => ServerError::TemplateNotFound(name),
            PipelineError::RenderError(msg) => ServerError::RenderError(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}
