//! Streaming chat handlers.
//!
//! Both endpoints return a `text/plain` body whose bytes arrive as the
//! model produces tokens. Dropping the connection drops the body
//! stream, which cancels the producer.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::Response;
use axum::Json;
use futures_util::stream;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ROLE_USER};
use crate::rag::{Answerer, GroundedAnswerer, PlainAnswerer};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct RagChatRequest {
    pub messages: Vec<ChatMessage>,
    pub pdf_uuid: String,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let (history, input) = split_last_user_turn(payload.messages)?;
    let answerer = PlainAnswerer::new(state.provider.clone());
    let rx = answerer.stream_answer(history, input).await?;
    stream_response(rx)
}

pub async fn rag_chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RagChatRequest>,
) -> Result<Response, ApiError> {
    if payload.pdf_uuid.trim().is_empty() {
        return Err(ApiError::BadRequest("pdf_uuid must not be empty".to_string()));
    }

    let (history, input) = split_last_user_turn(payload.messages)?;
    let answerer = GroundedAnswerer::new(
        state.provider.clone(),
        state.vectors.clone(),
        payload.pdf_uuid,
        state.config.rag.top_k,
    );
    let rx = answerer.stream_answer(history, input).await?;
    stream_response(rx)
}

/// The last message is the turn being answered; everything before it is
/// conversational context.
fn split_last_user_turn(
    mut messages: Vec<ChatMessage>,
) -> Result<(Vec<ChatMessage>, String), ApiError> {
    let last = messages
        .pop()
        .ok_or_else(|| ApiError::BadRequest("messages must not be empty".to_string()))?;
    if last.role != ROLE_USER {
        return Err(ApiError::BadRequest(
            "last message must be a user turn".to_string(),
        ));
    }
    Ok((messages, last.content))
}

/// Bridge a token receiver into a streaming response body.
fn stream_response(rx: mpsc::Receiver<Result<String, ApiError>>) -> Result<Response, ApiError> {
    let token_stream =
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from_stream(token_stream))
        .map_err(ApiError::internal)
}
