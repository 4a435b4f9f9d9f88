//! API handlers for the docgen server
//!
//! Provides REST endpoints for:
//! - Document generation
//! - Template listing
//! - Liveness checks

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use docx_engine::{GeneratedDocument, TemplateInfo};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::error::ServerError;
use crate::AppState;

/// Header carrying each non-fatal generation warning
pub const WARNING_HEADER: HeaderName = HeaderName::from_static("x-docgen-warning");

/// Liveness response
#[derive(Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub version: &'static str,
}

/// Handler: GET /
pub async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "API is live",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "docgen-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Template list response
#[derive(Serialize)]
pub struct TemplateListResponse {
    pub success: bool,
    pub templates: Vec<TemplateInfo>,
    pub count: usize,
}

/// Handler: GET /api/templates
pub async fn handle_list_templates(
    State(state): State<AppState>,
) -> Result<Json<TemplateListResponse>, ServerError> {
    let templates = state.pipeline.templates().map_err(|e| {
        warn!("Template listing failed: {}", e);
        ServerError::from(e)
    })?;
    let count = templates.len();

    Ok(Json(TemplateListResponse {
        success: true,
        templates,
        count,
    }))
}

/// Handler: POST /generate and POST /generate-cv
///
/// The body is read as raw bytes so the request content type never affects
/// parsing.
pub async fn handle_generate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ServerError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("generate", %request_id);

    async move {
        info!("Generate request ({} bytes)", body.len());

        let document = run_pipeline(&state, body).await.map_err(|e| {
            warn!("Generation failed: {}", e);
            e
        })?;

        for warning in &document.warnings {
            warn!("Generation warning: {}", warning);
        }
        info!(
            "Sending {} ({} bytes) from {}",
            document.filename,
            document.bytes.len(),
            document.template
        );

        document_response(document)
    }
    .instrument(span)
    .await
}

/// Run the blocking pipeline off the async runtime, bounded by the render timeout
async fn run_pipeline(state: &AppState, body: Bytes) -> Result<GeneratedDocument, ServerError> {
    let pipeline = Arc::clone(&state.pipeline);
    let span = Span::current();

    let result = tokio::time::timeout(
        Duration::from_millis(state.timeout_ms),
        tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            pipeline.generate_from_slice(&body)
        }),
    )
    .await;

    match result {
        Ok(Ok(generated)) => Ok(generated?),
        Ok(Err(join_error)) => Err(ServerError::Internal(format!(
            "Generation task panicked: {}",
            join_error
        ))),
        Err(_) => Err(ServerError::Timeout(state.timeout_ms)),
    }
}

/// Build the download response for a generated document
fn document_response(document: GeneratedDocument) -> Result<Response, ServerError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(document.content_type));

    let disposition = format!("attachment; filename=\"{}\"", document.filename);
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| ServerError::Internal(format!("Invalid download filename: {}", e)))?;
    headers.insert(CONTENT_DISPOSITION, disposition);

    for warning in &document.warnings {
        match HeaderValue::from_str(&warning.to_string()) {
            Ok(value) => {
                headers.append(WARNING_HEADER, value);
            }
            Err(_) => debug!("Warning not representable as a header: {}", warning),
        }
    }

    Ok((StatusCode::OK, headers, document.bytes).into_response())
}
