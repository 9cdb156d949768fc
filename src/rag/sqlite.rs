//! SQLite-backed embedding index.
//!
//! In-process vector store using SQLite for chunk rows and brute-force
//! cosine similarity for search. Document inserts run in one transaction
//! so readers never observe a partially ingested document.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{ChunkSearchResult, StoredChunk, VectorStore};
use crate::core::errors::ApiError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteVectorStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::storage)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                document_id TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                metadata TEXT DEFAULT '{}',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::storage)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> StoredChunk {
        let metadata_str: String = row.get("metadata");
        let metadata = serde_json::from_str::<Value>(&metadata_str).ok();

        StoredChunk {
            chunk_id: row.get("chunk_id"),
            content: row.get("content"),
            document_id: row.get("document_id"),
            source: row.get("source"),
            metadata,
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert_document(
        &self,
        document_id: &str,
        items: Vec<(StoredChunk, Vec<f32>)>,
    ) -> Result<(), ApiError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::storage)?;

        for (chunk, embedding) in &items {
            if chunk.document_id != document_id {
                return Err(ApiError::Internal(format!(
                    "chunk {} tagged with foreign document id",
                    chunk.chunk_id
                )));
            }

            let blob = Self::serialize_embedding(embedding);
            let metadata_str = chunk
                .metadata
                .as_ref()
                .map(|m| serde_json::to_string(m).unwrap_or_default())
                .unwrap_or_else(|| "{}".to_string());

            sqlx::query(
                "INSERT OR REPLACE INTO chunks (chunk_id, content, document_id, source, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.content)
            .bind(&chunk.document_id)
            .bind(&chunk.source)
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::storage)?;
        }

        tx.commit().await.map_err(ApiError::storage)?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        document_id: &str,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        let rows = sqlx::query(
            "SELECT chunk_id, content, document_id, source, metadata, embedding
             FROM chunks
             WHERE document_id = ?1",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::storage)?;

        let mut scored: Vec<ChunkSearchResult> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored_emb = Self::deserialize_embedding(&embedding_bytes);
                let score = Self::cosine_similarity(query_embedding, &stored_emb);

                Some(ChunkSearchResult {
                    chunk: Self::row_to_chunk(row),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit.max(1));

        Ok(scored)
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::storage)?;

        Ok(result.rows_affected() as usize)
    }

    async fn count(&self, document_id: Option<&str>) -> Result<usize, ApiError> {
        let count: i64 = if let Some(document_id) = document_id {
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?1")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::storage)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::storage)?
        };

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteVectorStore {
        let tmp = std::env::temp_dir().join(format!("docchat-rag-test-{}.db", uuid::Uuid::new_v4()));
        SqliteVectorStore::new(tmp).await.unwrap()
    }

    fn make_chunk(id: &str, content: &str, document_id: &str) -> StoredChunk {
        StoredChunk {
            chunk_id: id.to_string(),
            content: content.to_string(),
            document_id: document_id.to_string(),
            source: "test.pdf".to_string(),
            metadata: Some(serde_json::json!({ "page": 1, "start_offset": 0 })),
        }
    }

    #[tokio::test]
    async fn insert_and_search() {
        let store = test_store().await;

        let items = vec![
            (make_chunk("c1", "Hello world", "doc-a"), vec![1.0, 0.0, 0.0]),
            (make_chunk("c2", "Goodbye", "doc-a"), vec![0.0, 1.0, 0.0]),
        ];
        store.insert_document("doc-a", items).await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 2);

        let results = store.search(&[1.0, 0.0, 0.0], 10, "doc-a").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.chunk_id, "c1");
        assert!(results[0].score > 0.99);
    }

    #[tokio::test]
    async fn search_is_scoped_to_document() {
        let store = test_store().await;

        store
            .insert_document("doc-a", vec![(make_chunk("c1", "alpha", "doc-a"), vec![1.0])])
            .await
            .unwrap();
        store
            .insert_document("doc-b", vec![(make_chunk("c2", "beta", "doc-b"), vec![1.0])])
            .await
            .unwrap();

        let results = store.search(&[1.0], 10, "doc-a").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_id, "c1");

        let results = store.search(&[1.0], 10, "doc-missing").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn insert_rejects_foreign_document_tag() {
        let store = test_store().await;

        let err = store
            .insert_document("doc-a", vec![(make_chunk("c1", "alpha", "doc-b"), vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_document_removes_all_chunks() {
        let store = test_store().await;

        let items = vec![
            (make_chunk("c1", "one", "doc-a"), vec![1.0]),
            (make_chunk("c2", "two", "doc-a"), vec![0.5]),
        ];
        store.insert_document("doc-a", items).await.unwrap();
        store
            .insert_document("doc-b", vec![(make_chunk("c3", "three", "doc-b"), vec![1.0])])
            .await
            .unwrap();

        let deleted = store.delete_document("doc-a").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count(None).await.unwrap(), 1);
        assert_eq!(store.count(Some("doc-b")).await.unwrap(), 1);
    }
}
