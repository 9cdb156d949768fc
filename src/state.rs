use std::sync::Arc;

use thiserror::Error;

use crate::core::config::{AppConfig, AppPaths};
use crate::core::errors::ApiError;
use crate::llm::{LlmProvider, OpenAiProvider};
use crate::rag::{IngestionPipeline, SqliteVectorStore, VectorStore};
use crate::storage::{BlobStore, ChatStore, FsBlobStore};

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("failed to load configuration: {0}")]
    Config(ApiError),
    #[error("failed to open chat store: {0}")]
    Chats(ApiError),
    #[error("failed to open vector store: {0}")]
    Vectors(ApiError),
    #[error("failed to build model provider: {0}")]
    Provider(ApiError),
}

/// Global application state shared across all routes.
///
/// Every external collaborator (model provider, blob store, relational
/// table, embedding index) is constructed once here and injected into
/// the pipeline; nothing is resolved from ambient globals per request.
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: AppConfig,
    pub chats: ChatStore,
    pub blobs: Arc<dyn BlobStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub provider: Arc<dyn LlmProvider>,
    pub ingestion: IngestionPipeline,
}

impl AppState {
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config = AppConfig::load(&paths).map_err(InitializationError::Config)?;

        let chats = ChatStore::new(paths.chats_db_path.clone())
            .await
            .map_err(InitializationError::Chats)?;

        let vectors: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::new(paths.rag_db_path.clone())
                .await
                .map_err(InitializationError::Vectors)?,
        );

        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(paths.storage_dir.clone()));

        let provider: Arc<dyn LlmProvider> = Arc::new(
            OpenAiProvider::new(&config.provider).map_err(InitializationError::Provider)?,
        );

        let ingestion =
            IngestionPipeline::new(provider.clone(), vectors.clone(), blobs.clone(), &config.rag);

        Ok(Arc::new(AppState {
            paths,
            config,
            chats,
            blobs,
            vectors,
            provider,
            ingestion,
        }))
    }
}
