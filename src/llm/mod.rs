//! Language and embedding model clients.
//!
//! `LlmProvider` is the abstract interface the pipeline consumes;
//! `OpenAiProvider` is the OpenAI-compatible HTTP implementation.

mod openai;
mod provider;
mod types;

pub use openai::OpenAiProvider;
pub use provider::LlmProvider;
pub use types::{ChatMessage, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_USER};
