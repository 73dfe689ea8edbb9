//! API request handlers.

use super::error::{status_for, ApiError};
use super::types::{
    ApiState, HealthResponse, OcrResponse, SummarizeRequest, SummarizeResponse, SESSION_HEADER,
};
use crate::error::PipelineError;
use crate::output::PipelineRun;
use crate::pipeline::input::Document;
use crate::pipeline::llm::validate_text;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Multipart field carrying the upload.
const PDF_FIELD: &str = "pdf";

/// Summarise text the client already has.
///
/// POST /api/summarize
///
/// Body: `{"text": string}`. Missing, non-string and empty text are all
/// rejected with 400 before the model is contacted.
pub async fn summarize_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<Json<SummarizeResponse>, ApiError> {
    let Json(request) = payload?;
    let text = request
        .text
        .ok_or(PipelineError::MissingField { field: "text" })?;
    let text = validate_text(&text)?;

    let ticket = state.registry.begin(session_id(&headers));
    let result = state.controller.summarize_text(text, &ticket).await;

    Ok(Json(SummarizeResponse {
        summary: result?.text,
    }))
}

/// OCR an uploaded PDF, ignoring its text layer.
///
/// POST /api/extractOcr
///
/// Multipart field `pdf`. `fullText` may be empty when no page produced
/// text.
pub async fn extract_ocr_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<OcrResponse>, ApiError> {
    let document = read_upload(multipart).await?;

    let ticket = state.registry.begin(session_id(&headers));
    let result = state.controller.ocr_only(&document, &ticket).await;

    Ok(Json(OcrResponse {
        full_text: result?.text,
    }))
}

/// Run the whole pipeline on an uploaded PDF.
///
/// POST /api/process
///
/// Always answers with the serialised [`PipelineRun`]; the status code
/// reflects the failure class when the run failed.
pub async fn process_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let document = read_upload(multipart).await?;

    let ticket = state.registry.begin(session_id(&headers));
    let run = state.controller.run_with(&document, &ticket).await;

    Ok((run_status(&run), Json(run)).into_response())
}

/// Health check endpoint handler.
///
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn run_status(run: &PipelineRun) -> StatusCode {
    match &run.failure {
        Some(failure) => status_for(failure.kind),
        None => StatusCode::OK,
    }
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Pull the `pdf` field out of a multipart body and validate it.
async fn read_upload(mut multipart: Multipart) -> Result<Document, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(PDF_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;

        return Ok(Document::from_upload(
            data.to_vec(),
            content_type.as_deref(),
            file_name,
        )?);
    }

    Err(PipelineError::MissingField { field: PDF_FIELD }.into())
}
