//! Streaming answerers.
//!
//! A request moves through rewrite → retrieve → generate; every stage
//! failure carries the stage it happened in. `PlainAnswerer` skips
//! retrieval entirely; `GroundedAnswerer` restricts generation to
//! chunks of one document.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::rewriter::QueryRewriter;
use super::store::VectorStore;
use crate::core::errors::{ApiError, ProviderStage};
use crate::llm::{ChatMessage, LlmProvider};

const GROUNDED_SYSTEM_PROMPT: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer \
the question. If you don't know the answer, say that you \
don't know. Use three sentences maximum and keep the \
answer concise.";

/// Common streaming-answer contract: tokens are yielded on the receiver
/// as the model produces them; dropping the receiver cancels generation.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn stream_answer(
        &self,
        history: Vec<ChatMessage>,
        input: String,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError>;
}

/// Plain chat: the conversation goes to the model unchanged.
pub struct PlainAnswerer {
    provider: Arc<dyn LlmProvider>,
}

impl PlainAnswerer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Answerer for PlainAnswerer {
    async fn stream_answer(
        &self,
        history: Vec<ChatMessage>,
        input: String,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let mut messages = history;
        messages.push(ChatMessage::user(input));
        self.provider
            .stream_chat(messages)
            .await
            .map_err(|err| err.at_stage(ProviderStage::Generate))
    }
}

/// Retrieval-augmented chat scoped to a single document.
pub struct GroundedAnswerer {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn VectorStore>,
    rewriter: QueryRewriter,
    document_id: String,
    top_k: usize,
}

impl GroundedAnswerer {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn VectorStore>,
        document_id: String,
        top_k: usize,
    ) -> Self {
        let rewriter = QueryRewriter::new(provider.clone());
        Self {
            provider,
            store,
            rewriter,
            document_id,
            top_k,
        }
    }
}

#[async_trait]
impl Answerer for GroundedAnswerer {
    async fn stream_answer(
        &self,
        history: Vec<ChatMessage>,
        input: String,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let standalone = self.rewriter.rewrite(&history, &input).await?;

        let query_vectors = self
            .provider
            .embed(&[standalone.clone()])
            .await
            .map_err(|err| err.at_stage(ProviderStage::Retrieve))?;
        let query_vector = query_vectors.first().ok_or_else(|| ApiError::Provider {
            stage: ProviderStage::Retrieve,
            message: "embedding provider returned no vector for query".to_string(),
        })?;

        let hits = self
            .store
            .search(query_vector, self.top_k, &self.document_id)
            .await?;

        tracing::debug!(
            document_id = %self.document_id,
            retrieved = hits.len(),
            query = %standalone,
            "retrieved grounding context"
        );

        // Zero hits still go to the model with an empty context; the
        // system instruction makes it decline to answer.
        let context = hits
            .iter()
            .map(|hit| hit.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(format!(
            "{GROUNDED_SYSTEM_PROMPT}\n\n{context}"
        )));
        messages.extend(history);
        messages.push(ChatMessage::user(input));

        self.provider
            .stream_chat(messages)
            .await
            .map_err(|err| err.at_stage(ProviderStage::Generate))
    }
}
