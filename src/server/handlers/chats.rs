//! Chat session persistence handlers.
//!
//! Transcripts live in the blob store; the relational table only keeps
//! per-chat metadata. Saves write the blob first and then upsert the
//! row, so a row failure leaves at worst an orphaned transcript blob
//! that the next save overwrites.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::llm::ChatMessage;
use crate::state::AppState;
use crate::storage::{BlobStore, ChatUpsert};

#[derive(Debug, Deserialize)]
pub struct SaveChatRequest {
    pub chat_id: String,
    pub chat_name: String,
    pub messages: Vec<ChatMessage>,
    pub pdf_name: Option<String>,
    pub pdf_path: Option<String>,
    pub pdf_uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteChatRequest {
    pub chat_id: String,
}

pub async fn load_chat(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.chats.list().await?;

    let mut chats: Vec<Value> = Vec::with_capacity(records.len());
    for record in records {
        if !state.blobs.exists(&record.transcript_path).await? {
            continue;
        }

        let bytes = state.blobs.get(&record.transcript_path).await?;
        let messages: Vec<ChatMessage> = match serde_json::from_slice(&bytes) {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(
                    chat_id = %record.id,
                    "skipping chat with unreadable transcript: {err}"
                );
                continue;
            }
        };

        chats.push(json!({
            "id": record.id,
            "chat_name": record.name,
            "messages": messages,
            "pdf_name": record.pdf_name,
            "pdf_path": record.pdf_path,
            "pdf_uuid": record.pdf_uuid,
        }));
    }

    Ok(Json(chats))
}

pub async fn save_chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SaveChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.chat_id.trim().is_empty() {
        return Err(ApiError::BadRequest("chat_id must not be empty".to_string()));
    }

    let transcript_path = format!("chat_logs/{}.json", payload.chat_id);
    let transcript =
        serde_json::to_vec_pretty(&payload.messages).map_err(ApiError::internal)?;

    state.blobs.put(&transcript_path, &transcript).await?;

    state
        .chats
        .upsert(ChatUpsert {
            id: payload.chat_id,
            name: payload.chat_name,
            transcript_path,
            pdf_name: payload.pdf_name,
            pdf_path: payload.pdf_path,
            pdf_uuid: payload.pdf_uuid,
        })
        .await?;

    Ok(Json(json!({ "message": "Chat saved successfully" })))
}

pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DeleteChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .chats
        .get(&payload.chat_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Chat not found".to_string()))?;

    state.chats.delete(&payload.chat_id).await?;

    // Blob cleanup is best-effort; an absent blob is not an error and a
    // failing delete must not undo the row removal.
    if let Err(err) = state.blobs.delete(&record.transcript_path).await {
        tracing::warn!(chat_id = %record.id, "failed to delete transcript blob: {err}");
    }
    if let Some(pdf_path) = &record.pdf_path {
        if let Err(err) = state.blobs.delete(pdf_path).await {
            tracing::warn!(chat_id = %record.id, "failed to delete document blob: {err}");
        }
    }

    Ok(Json(json!({ "message": "Chat deleted successfully" })))
}
