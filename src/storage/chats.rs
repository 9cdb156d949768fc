//! Relational bookkeeping for chat sessions.
//!
//! One row per chat in `advanced_chats`; the transcript itself lives in
//! the blob store at the row's `transcript_path`.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct ChatRecord {
    pub id: String,
    pub name: String,
    pub transcript_path: String,
    pub pdf_name: Option<String>,
    pub pdf_path: Option<String>,
    pub pdf_uuid: Option<String>,
    pub last_update: String,
}

#[derive(Debug, Clone)]
pub struct ChatUpsert {
    pub id: String,
    pub name: String,
    pub transcript_path: String,
    pub pdf_name: Option<String>,
    pub pdf_path: Option<String>,
    pub pdf_uuid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatStore {
    #[allow(dead_code)]
    db_path: PathBuf,
    pool: SqlitePool,
}

impl ChatStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await
            .map_err(ApiError::storage)?;

        let store = Self { db_path, pool };
        store.init_db().await?;
        Ok(store)
    }

    async fn init_db(&self) -> Result<(), ApiError> {
        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS advanced_chats (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                transcript_path TEXT NOT NULL,
                pdf_name TEXT,
                pdf_path TEXT,
                pdf_uuid TEXT,
                last_update TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::storage)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_advanced_chats_last_update
             ON advanced_chats(last_update DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::storage)?;

        Ok(())
    }

    pub async fn upsert(&self, chat: ChatUpsert) -> Result<(), ApiError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        sqlx::query(
            "\
            INSERT INTO advanced_chats (id, name, transcript_path, pdf_name, pdf_path, pdf_uuid, last_update)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (id)
            DO UPDATE SET name = excluded.name,
                          transcript_path = excluded.transcript_path,
                          pdf_name = excluded.pdf_name,
                          pdf_path = excluded.pdf_path,
                          pdf_uuid = excluded.pdf_uuid,
                          last_update = excluded.last_update",
        )
        .bind(&chat.id)
        .bind(&chat.name)
        .bind(&chat.transcript_path)
        .bind(&chat.pdf_name)
        .bind(&chat.pdf_path)
        .bind(&chat.pdf_uuid)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::storage)?;

        Ok(())
    }

    /// All chats, most recently updated first.
    pub async fn list(&self) -> Result<Vec<ChatRecord>, ApiError> {
        let rows = sqlx::query(
            "\
            SELECT id, name, transcript_path, pdf_name, pdf_path, pdf_uuid, last_update
            FROM advanced_chats
            ORDER BY last_update DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::storage)?;

        rows.into_iter()
            .map(chat_record_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::storage)
    }

    pub async fn get(&self, chat_id: &str) -> Result<Option<ChatRecord>, ApiError> {
        let row = sqlx::query(
            "\
            SELECT id, name, transcript_path, pdf_name, pdf_path, pdf_uuid, last_update
            FROM advanced_chats
            WHERE id = ?1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::storage)?;

        row.map(chat_record_from_row)
            .transpose()
            .map_err(ApiError::storage)
    }

    pub async fn delete(&self, chat_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM advanced_chats WHERE id = ?1")
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::storage)?;

        Ok(result.rows_affected() > 0)
    }
}

fn chat_record_from_row(row: sqlx::sqlite::SqliteRow) -> Result<ChatRecord, sqlx::Error> {
    Ok(ChatRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        transcript_path: row.try_get("transcript_path")?,
        pdf_name: row.try_get("pdf_name")?,
        pdf_path: row.try_get("pdf_path")?,
        pdf_uuid: row.try_get("pdf_uuid")?,
        last_update: row.try_get("last_update")?,
    })
}
