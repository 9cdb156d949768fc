//! Query rewriter: turns a conversational follow-up into a standalone
//! retrieval query.

use std::sync::Arc;

use crate::core::errors::{ApiError, ProviderStage};
use crate::llm::{ChatMessage, LlmProvider};

const CONTEXTUALIZE_SYSTEM_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, \
formulate a standalone question which can be understood \
without the chat history. Do NOT answer the question, \
just reformulate it if needed and otherwise return it as is.";

pub struct QueryRewriter {
    provider: Arc<dyn LlmProvider>,
}

impl QueryRewriter {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Resolve pronouns and ellipsis in `input` against `history`.
    ///
    /// With no history there is nothing to resolve, so the input is
    /// returned as-is without a model call.
    pub async fn rewrite(
        &self,
        history: &[ChatMessage],
        input: &str,
    ) -> Result<String, ApiError> {
        if history.is_empty() {
            return Ok(input.to_string());
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(CONTEXTUALIZE_SYSTEM_PROMPT));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(input));

        let rewritten = self
            .provider
            .chat(messages)
            .await
            .map_err(|err| err.at_stage(ProviderStage::Rewrite))?;

        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            return Ok(input.to_string());
        }
        Ok(rewritten.to_string())
    }
}
