//! Document ingestion pipeline.
//!
//! Turns an uploaded PDF into searchable chunks: extract text per page,
//! chunk, embed, and write everything into the embedding index tagged
//! with a fresh document identifier, then persist the source bytes to
//! blob storage for retention.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use super::chunker::TextSplitter;
use super::extract;
use super::store::{StoredChunk, VectorStore};
use crate::core::config::RagConfig;
use crate::core::errors::{ApiError, ProviderStage};
use crate::llm::LlmProvider;
use crate::storage::BlobStore;

/// Result of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub document_id: String,
    pub storage_path: String,
    pub chunk_count: usize,
}

pub struct IngestionPipeline {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn VectorStore>,
    blobs: Arc<dyn BlobStore>,
    splitter: TextSplitter,
    embed_batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn VectorStore>,
        blobs: Arc<dyn BlobStore>,
        config: &RagConfig,
    ) -> Self {
        Self {
            provider,
            store,
            blobs,
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap),
            embed_batch_size: config.embed_batch_size.max(1),
        }
    }

    /// Ingest a PDF document; returns the generated document id and the
    /// blob path the source bytes were stored under.
    ///
    /// Index writes are all-or-nothing per document: an embedding
    /// failure leaves the index untouched.
    pub async fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<IngestedDocument, ApiError> {
        let document_id = Uuid::new_v4().to_string();
        let pages = extract::pdf_pages(bytes)?;

        let mut chunks = Vec::new();
        for (page_idx, page) in pages.iter().enumerate() {
            for chunk in self.splitter.split(page) {
                chunks.push(StoredChunk {
                    chunk_id: Uuid::new_v4().to_string(),
                    content: chunk.text,
                    document_id: document_id.clone(),
                    source: filename.to_string(),
                    metadata: Some(json!({
                        "page": page_idx + 1,
                        "start_offset": chunk.start_offset,
                    })),
                });
            }
        }

        // A document with no extractable text is valid; it just never
        // matches a retrieval query.
        if !chunks.is_empty() {
            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embed_batched(&texts).await?;
            if vectors.len() != chunks.len() {
                return Err(ApiError::Provider {
                    stage: ProviderStage::Embed,
                    message: format!(
                        "expected {} embeddings, provider returned {}",
                        chunks.len(),
                        vectors.len()
                    ),
                });
            }

            let items: Vec<(StoredChunk, Vec<f32>)> =
                chunks.iter().cloned().zip(vectors).collect();
            self.store.insert_document(&document_id, items).await?;
        }

        let storage_path = document_storage_path(&document_id, filename);
        self.blobs.put(&storage_path, bytes).await?;

        tracing::info!(
            document_id = %document_id,
            pages = pages.len(),
            chunks = chunks.len(),
            "ingested document"
        );

        Ok(IngestedDocument {
            document_id,
            storage_path,
            chunk_count: chunks.len(),
        })
    }

    async fn embed_batched(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embed_batch_size) {
            let batch_vectors = self
                .provider
                .embed(batch)
                .await
                .map_err(|err| err.at_stage(ProviderStage::Embed))?;
            vectors.extend(batch_vectors);
        }
        Ok(vectors)
    }
}

/// Deterministic blob path for a document's source bytes.
pub fn document_storage_path(document_id: &str, filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!("pdf_store/{}_{}", document_id, safe)
}
