//! End-to-end tests for the ingestion and retrieval-augmented answering
//! pipeline, run against an in-process scripted model provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;

use docchat_backend::core::config::{AppConfig, AppPaths, RagConfig};
use docchat_backend::core::errors::{ApiError, ProviderStage};
use docchat_backend::llm::{ChatMessage, LlmProvider};
use docchat_backend::rag::{
    pdf_pages, Answerer, GroundedAnswerer, IngestionPipeline, QueryRewriter, SqliteVectorStore,
    VectorStore,
};
use docchat_backend::server::handlers::chats::{self, DeleteChatRequest, SaveChatRequest};
use docchat_backend::state::AppState;
use docchat_backend::storage::{BlobStore, ChatStore, FsBlobStore};

/// Deterministic provider standing in for the model services.
struct ScriptedProvider {
    chat_reply: String,
    stream_tokens: Vec<String>,
    fail_embed: bool,
    chat_calls: AtomicUsize,
    embed_calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(chat_reply: &str, stream_tokens: &[&str]) -> Self {
        Self {
            chat_reply: chat_reply.to_string(),
            stream_tokens: stream_tokens.iter().map(|t| t.to_string()).collect(),
            fail_embed: false,
            chat_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
        }
    }

    fn failing_embed() -> Self {
        let mut provider = Self::new("", &[]);
        provider.fail_embed = true;
        provider
    }
}

/// Cheap deterministic embedding: same text, same vector.
fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; 8];
    for (i, byte) in text.bytes().enumerate() {
        vector[(i + byte as usize) % 8] += byte as f32 / 255.0;
    }
    vector
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn chat(&self, _messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.chat_reply.clone())
    }

    async fn stream_chat(
        &self,
        _messages: Vec<ChatMessage>,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let (tx, rx) = mpsc::channel(8);
        let tokens = self.stream_tokens.clone();
        tokio::spawn(async move {
            for token in tokens {
                if tx.send(Ok(token)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(ApiError::provider("embedding service unavailable"));
        }
        Ok(inputs.iter().map(|text| embed_text(text)).collect())
    }
}

/// Minimal multi-page PDF with one text line per page, built with
/// correct stream lengths and xref offsets so `pdf-extract` parses it.
fn pdf_with_pages(page_texts: &[&str]) -> Vec<u8> {
    let n = page_texts.len();
    let font_obj = 3 + 2 * n;
    let mut out = Vec::new();
    let mut offsets = Vec::new();

    out.extend_from_slice(b"%PDF-1.4\n");
    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets.push(out.len());
    let kids = (0..n)
        .map(|i| format!("{} 0 R", 3 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids, n
        )
        .as_bytes(),
    );

    for (i, text) in page_texts.iter().enumerate() {
        let page_obj = 3 + 2 * i;
        let content_obj = page_obj + 1;
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 {} 0 R >> >> >> endobj\n",
                page_obj, content_obj, font_obj
            )
            .as_bytes(),
        );
        let stream = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET\n", text);
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}endstream endobj\n",
                content_obj,
                stream.len(),
                stream
            )
            .as_bytes(),
        );
    }

    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "{} 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
            font_obj
        )
        .as_bytes(),
    );

    let xref_start = out.len();
    let count = font_obj + 1;
    out.extend_from_slice(format!("xref\n0 {}\n", count).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for off in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            count, xref_start
        )
        .as_bytes(),
    );
    out
}

struct TestEnv {
    _tmp: TempDir,
    provider: Arc<ScriptedProvider>,
    vectors: Arc<dyn VectorStore>,
    blobs: Arc<dyn BlobStore>,
    pipeline: IngestionPipeline,
}

async fn test_env(provider: ScriptedProvider) -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(provider);
    let vectors: Arc<dyn VectorStore> = Arc::new(
        SqliteVectorStore::new(tmp.path().join("rag.db"))
            .await
            .unwrap(),
    );
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(tmp.path().join("storage")));
    let pipeline = IngestionPipeline::new(
        provider.clone(),
        vectors.clone(),
        blobs.clone(),
        &RagConfig::default(),
    );

    TestEnv {
        _tmp: tmp,
        provider,
        vectors,
        blobs,
        pipeline,
    }
}

async fn collect_stream(mut rx: mpsc::Receiver<Result<String, ApiError>>) -> Result<String, ApiError> {
    let mut out = String::new();
    while let Some(item) = rx.recv().await {
        out.push_str(&item?);
    }
    Ok(out)
}

#[tokio::test]
async fn three_page_ingest_and_grounded_answer() {
    let env = test_env(ScriptedProvider::new(
        "What is on page 2?",
        &["Page 2 ", "mentions ", "Beta."],
    ))
    .await;

    let bytes = pdf_with_pages(&[
        "Alpha. Beta. Gamma.",
        "Alpha. Beta. Gamma.",
        "Alpha. Beta. Gamma.",
    ]);
    let pages = pdf_pages(&bytes).unwrap();
    assert!(pages.iter().any(|p| p.contains("Alpha")));

    let ingested = env.pipeline.ingest("trilogy.pdf", &bytes).await.unwrap();
    assert!(ingested.chunk_count > 0);
    assert!(env.blobs.exists(&ingested.storage_path).await.unwrap());
    assert_eq!(
        env.vectors
            .count(Some(ingested.document_id.as_str()))
            .await
            .unwrap(),
        ingested.chunk_count
    );

    // Chunks tile each page: the furthest chunk end per page must equal
    // the page's extracted length, so no trailing content was dropped.
    let all = env
        .vectors
        .search(&embed_text("anything"), ingested.chunk_count, &ingested.document_id)
        .await
        .unwrap();
    assert_eq!(all.len(), ingested.chunk_count);
    let mut ends: std::collections::BTreeMap<u64, usize> = Default::default();
    for hit in &all {
        let meta = hit.chunk.metadata.as_ref().unwrap();
        let page = meta["page"].as_u64().unwrap();
        let end = meta["start_offset"].as_u64().unwrap() as usize
            + hit.chunk.content.chars().count();
        let entry = ends.entry(page).or_default();
        *entry = (*entry).max(end);
    }
    let covered_total: usize = ends.values().sum();
    let extracted_total: usize = pages
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| p.chars().count())
        .sum();
    assert_eq!(covered_total, extracted_total);

    // Grounded answer retrieves chunks of this document and streams a
    // non-empty reply.
    let answerer = GroundedAnswerer::new(
        env.provider.clone(),
        env.vectors.clone(),
        ingested.document_id.clone(),
        5,
    );
    let rx = answerer
        .stream_answer(Vec::new(), "What is on page 2?".to_string())
        .await
        .unwrap();
    let answer = collect_stream(rx).await.unwrap();
    assert_eq!(answer, "Page 2 mentions Beta.");

    // Isolation: a different document id retrieves none of these chunks.
    let foreign = env
        .vectors
        .search(&embed_text("Alpha"), 5, "some-other-document")
        .await
        .unwrap();
    assert!(foreign.is_empty());
}

#[tokio::test]
async fn embedding_failure_leaves_no_partial_state() {
    let env = test_env(ScriptedProvider::failing_embed()).await;

    let bytes = pdf_with_pages(&["Some content that will fail to embed."]);
    let err = env.pipeline.ingest("doomed.pdf", &bytes).await.unwrap_err();
    match err {
        ApiError::Provider { stage, .. } => assert_eq!(stage, ProviderStage::Embed),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(env.vectors.count(None).await.unwrap(), 0);
    // The source blob is only persisted after a successful index write.
    let storage = env.blobs.exists("pdf_store").await.unwrap_or(false);
    assert!(!storage);
}

#[tokio::test]
async fn non_pdf_input_is_rejected() {
    let env = test_env(ScriptedProvider::new("", &[])).await;
    let err = env.pipeline.ingest("junk.pdf", b"not a pdf").await.unwrap_err();
    assert!(matches!(err, ApiError::UnsupportedFormat(_)));
    assert_eq!(env.vectors.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn rewrite_with_empty_history_skips_the_model() {
    let provider = Arc::new(ScriptedProvider::new("rewritten question", &[]));
    let rewriter = QueryRewriter::new(provider.clone());

    let result = rewriter.rewrite(&[], "What about Beta?").await.unwrap();
    assert_eq!(result, "What about Beta?");
    assert_eq!(provider.chat_calls.load(Ordering::SeqCst), 0);

    let history = vec![
        ChatMessage::user("Tell me about the trilogy."),
        ChatMessage::assistant("It covers Alpha, Beta and Gamma."),
    ];
    let result = rewriter.rewrite(&history, "What about Beta?").await.unwrap();
    assert_eq!(result, "rewritten question");
    assert_eq!(provider.chat_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn grounded_answer_over_empty_document_still_streams() {
    let env = test_env(ScriptedProvider::new(
        "",
        &["I don't know based on the provided context."],
    ))
    .await;

    let answerer = GroundedAnswerer::new(
        env.provider.clone(),
        env.vectors.clone(),
        "document-with-no-chunks".to_string(),
        5,
    );
    let rx = answerer
        .stream_answer(Vec::new(), "What does the document say?".to_string())
        .await
        .unwrap();
    let answer = collect_stream(rx).await.unwrap();
    assert!(answer.contains("don't know"));
}

async fn handler_state(provider: ScriptedProvider) -> (TempDir, Arc<AppState>) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let paths = Arc::new(AppPaths {
        data_dir: root.clone(),
        log_dir: root.join("logs"),
        chats_db_path: root.join("docchat.db"),
        rag_db_path: root.join("rag.db"),
        storage_dir: root.join("storage"),
        config_path: root.join("docchat.toml"),
    });
    let config = AppConfig::default();

    let chats = ChatStore::new(paths.chats_db_path.clone()).await.unwrap();
    let vectors: Arc<dyn VectorStore> = Arc::new(
        SqliteVectorStore::new(paths.rag_db_path.clone())
            .await
            .unwrap(),
    );
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(paths.storage_dir.clone()));
    let provider: Arc<dyn LlmProvider> = Arc::new(provider);
    let ingestion =
        IngestionPipeline::new(provider.clone(), vectors.clone(), blobs.clone(), &config.rag);

    let state = Arc::new(AppState {
        paths,
        config,
        chats,
        blobs,
        vectors,
        provider,
        ingestion,
    });
    (tmp, state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn save_load_delete_chat_round_trip() {
    let (_tmp, state) = handler_state(ScriptedProvider::new("", &[])).await;

    let messages = vec![
        ChatMessage::user("hello"),
        ChatMessage::assistant("hi there"),
    ];
    chats::save_chat(
        State(state.clone()),
        Json(SaveChatRequest {
            chat_id: "chat-1".to_string(),
            chat_name: "Greetings".to_string(),
            messages: messages.clone(),
            pdf_name: None,
            pdf_path: None,
            pdf_uuid: None,
        }),
    )
    .await
    .unwrap();

    let response = chats::load_chat(State(state.clone()))
        .await
        .unwrap()
        .into_response();
    let listed = body_json(response).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], "chat-1");
    assert_eq!(listed[0]["chat_name"], "Greetings");
    assert_eq!(listed[0]["messages"].as_array().unwrap().len(), 2);
    assert_eq!(listed[0]["messages"][0]["content"], "hello");

    // Transcript blob is where the metadata row says it is.
    assert!(state.blobs.exists("chat_logs/chat-1.json").await.unwrap());

    chats::delete_chat(
        State(state.clone()),
        Json(DeleteChatRequest {
            chat_id: "chat-1".to_string(),
        }),
    )
    .await
    .unwrap();

    let response = chats::load_chat(State(state.clone()))
        .await
        .unwrap()
        .into_response();
    let listed = body_json(response).await;
    assert!(listed.as_array().unwrap().is_empty());
    assert!(!state.blobs.exists("chat_logs/chat-1.json").await.unwrap());
}

#[tokio::test]
async fn delete_of_unknown_chat_is_not_found() {
    let (_tmp, state) = handler_state(ScriptedProvider::new("", &[])).await;

    let result = chats::delete_chat(
        State(state),
        Json(DeleteChatRequest {
            chat_id: "missing".to_string(),
        }),
    )
    .await;
    let Err(err) = result else {
        panic!("delete of unknown chat should fail");
    };
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn delete_chat_also_removes_document_blob() {
    let (_tmp, state) = handler_state(ScriptedProvider::new("", &[])).await;

    state
        .blobs
        .put("pdf_store/d1_report.pdf", b"%PDF-fake")
        .await
        .unwrap();
    chats::save_chat(
        State(state.clone()),
        Json(SaveChatRequest {
            chat_id: "chat-2".to_string(),
            chat_name: "With doc".to_string(),
            messages: vec![ChatMessage::user("q")],
            pdf_name: Some("report.pdf".to_string()),
            pdf_path: Some("pdf_store/d1_report.pdf".to_string()),
            pdf_uuid: Some("d1".to_string()),
        }),
    )
    .await
    .unwrap();

    chats::delete_chat(
        State(state.clone()),
        Json(DeleteChatRequest {
            chat_id: "chat-2".to_string(),
        }),
    )
    .await
    .unwrap();

    assert!(!state.blobs.exists("pdf_store/d1_report.pdf").await.unwrap());
}
