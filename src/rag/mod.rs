//! Retrieval-augmented generation: chunking, the embedding index,
//! document ingestion, query rewriting, and grounded answering.

mod answerer;
mod chunker;
mod extract;
mod ingest;
mod rewriter;
mod sqlite;
mod store;

pub use answerer::{Answerer, GroundedAnswerer, PlainAnswerer};
pub use chunker::{Chunk, TextSplitter};
pub use extract::pdf_pages;
pub use ingest::{document_storage_path, IngestedDocument, IngestionPipeline};
pub use rewriter::QueryRewriter;
pub use sqlite::SqliteVectorStore;
pub use store::{ChunkSearchResult, StoredChunk, VectorStore};
