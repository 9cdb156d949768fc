//! PDF upload and ingestion.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

const PDF_CONTENT_TYPE: &str = "application/pdf";

pub async fn upload_pdf(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("malformed multipart body: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        if field.content_type() != Some(PDF_CONTENT_TYPE) {
            return Err(ApiError::BadRequest(
                "Only PDF files are allowed.".to_string(),
            ));
        }

        let filename = field
            .file_name()
            .map(|name| name.to_string())
            .unwrap_or_else(|| "document.pdf".to_string());

        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::BadRequest(format!("failed to read upload: {err}")))?;

        let ingested = state.ingestion.ingest(&filename, &bytes).await?;

        return Ok(Json(json!({
            "message": "File uploaded successfully",
            "pdf_uuid": ingested.document_id,
            "pdf_path": ingested.storage_path,
            "chunk_count": ingested.chunk_count,
        })));
    }

    Err(ApiError::BadRequest("missing file field".to_string()))
}
