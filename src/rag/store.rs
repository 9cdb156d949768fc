//! VectorStore trait — abstract interface for the embedding index.
//!
//! Chunks are scoped to the document that produced them; retrieval is
//! always filtered by document id so one document's content can never
//! surface for another.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A stored chunk with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Unique chunk identifier.
    pub chunk_id: String,
    /// The text content of the chunk.
    pub content: String,
    /// Identifier of the owning document.
    pub document_id: String,
    /// Original filename of the source document.
    pub source: String,
    /// Optional metadata (JSON), e.g. page number and start offset.
    pub metadata: Option<serde_json::Value>,
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSearchResult {
    pub chunk: StoredChunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

/// Abstract trait for the embedding index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert all chunks of one document atomically: either every
    /// chunk+vector pair commits or none do.
    async fn insert_document(
        &self,
        document_id: &str,
        items: Vec<(StoredChunk, Vec<f32>)>,
    ) -> Result<(), ApiError>;

    /// Return up to `limit` chunks of `document_id` most similar to the
    /// query embedding, best first. Fewer than `limit` if fewer match.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        document_id: &str,
    ) -> Result<Vec<ChunkSearchResult>, ApiError>;

    /// Delete all chunks for a document; returns the number removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize, ApiError>;

    /// Total chunk count, optionally restricted to one document.
    async fn count(&self, document_id: Option<&str>) -> Result<usize, ApiError>;
}
