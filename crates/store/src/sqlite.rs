//! SQLite store with FTS5 full-text search over the knowledge base.
//!
//! Tables:
//! - `sessions` holds one row per conversation (context/state/feedback as JSON)
//! - `session_messages` holds the append-only history, ordered by `seq`
//! - `knowledge` holds curated entries
//! - `knowledge_fts` is an FTS5 index over title, content and keywords
//!
//! Triggers keep the FTS index in sync with the `knowledge` table.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rigchat_core::error::StoreError;
use rigchat_core::knowledge::{KnowledgeCategory, KnowledgeEntry, KnowledgeStatus, KnowledgeUsage};
use rigchat_core::message::{Message, MessageMetadata, Role};
use rigchat_core::session::{Feedback, Session, SessionContext, SessionId, SessionState, SessionStatus};
use rigchat_core::store::{KnowledgeQuery, KnowledgeStore, MessageSlice, SessionStore, StatusUpdate};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

/// Durable store for sessions and knowledge backed by one SQLite database.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path.contains(":memory:");
        let options = if path.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(path)
                .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
        } else {
            SqliteConnectOptions::new().filename(path)
        };

        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Every connection to :memory: is a separate database
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let steps: &[(&str, &str)] = &[
            (
                "sessions table",
                r#"
                CREATE TABLE IF NOT EXISTS sessions (
                    session_id  TEXT PRIMARY KEY NOT NULL,
                    user_id     TEXT,
                    context     TEXT NOT NULL,
                    state       TEXT NOT NULL,
                    status      TEXT NOT NULL DEFAULT 'active',
                    feedback    TEXT,
                    created_at  TEXT NOT NULL,
                    updated_at  TEXT NOT NULL,
                    ended_at    TEXT,
                    duration_ms INTEGER
                )
                "#,
            ),
            (
                "session_messages table",
                r#"
                CREATE TABLE IF NOT EXISTS session_messages (
                    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id  TEXT NOT NULL REFERENCES sessions(session_id),
                    id          TEXT NOT NULL,
                    role        TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    metadata    TEXT NOT NULL DEFAULT '{}',
                    timestamp   TEXT NOT NULL
                )
                "#,
            ),
            (
                "session_messages index",
                "CREATE INDEX IF NOT EXISTS idx_session_messages_session ON session_messages(session_id, seq)",
            ),
            (
                "knowledge table",
                r#"
                CREATE TABLE IF NOT EXISTS knowledge (
                    iid              INTEGER PRIMARY KEY AUTOINCREMENT,
                    id               TEXT UNIQUE NOT NULL,
                    title            TEXT NOT NULL,
                    content          TEXT NOT NULL,
                    category         TEXT NOT NULL,
                    tags             TEXT NOT NULL DEFAULT '[]',
                    keywords         TEXT NOT NULL DEFAULT '[]',
                    embedding        BLOB,
                    access_count     INTEGER NOT NULL DEFAULT 0,
                    last_accessed_at TEXT,
                    effectiveness    REAL NOT NULL DEFAULT 0.0,
                    status           TEXT NOT NULL DEFAULT 'active'
                )
                "#,
            ),
            (
                "knowledge category index",
                "CREATE INDEX IF NOT EXISTS idx_knowledge_category ON knowledge(category, status)",
            ),
            (
                "FTS5 table",
                r#"
                CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_fts USING fts5(
                    title,
                    content,
                    keywords,
                    content='knowledge',
                    content_rowid='iid',
                    tokenize='unicode61 remove_diacritics 2'
                )
                "#,
            ),
            (
                "insert trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS knowledge_ai AFTER INSERT ON knowledge BEGIN
                    INSERT INTO knowledge_fts(rowid, title, content, keywords)
                    VALUES (new.iid, new.title, new.content, new.keywords);
                END
                "#,
            ),
            (
                "delete trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS knowledge_ad AFTER DELETE ON knowledge BEGIN
                    INSERT INTO knowledge_fts(knowledge_fts, rowid, title, content, keywords)
                    VALUES ('delete', old.iid, old.title, old.content, old.keywords);
                END
                "#,
            ),
            (
                "update trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS knowledge_au AFTER UPDATE OF title, content, keywords ON knowledge BEGIN
                    INSERT INTO knowledge_fts(knowledge_fts, rowid, title, content, keywords)
                    VALUES ('delete', old.iid, old.title, old.content, old.keywords);
                    INSERT INTO knowledge_fts(rowid, title, content, keywords)
                    VALUES (new.iid, new.title, new.content, new.keywords);
                END
                "#,
            ),
        ];

        for (what, sql) in steps {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Build a safe FTS5 query: each word quoted, prefix-matched, OR-joined.
    fn sanitize_fts_query(text: &str) -> String {
        text.split_whitespace()
            .map(|w| {
                w.chars()
                    .filter(|c| c.is_alphanumeric() || *c == '_')
                    .collect::<String>()
            })
            .filter(|w| !w.is_empty())
            .map(|w| format!("\"{w}\"*"))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    async fn session_exists(&self, id: &SessionId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM sessions WHERE session_id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("session lookup: {e}")))?;
        Ok(row.is_some())
    }

    async fn load_messages(&self, id: &SessionId, offset: usize, limit: usize) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM session_messages WHERE session_id = ?1 ORDER BY seq LIMIT ?2 OFFSET ?3",
        )
        .bind(id.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("messages: {e}")))?;

        rows.iter().map(row_to_message).collect()
    }

    /// Update one JSON column of a session and bump `updated_at`.
    async fn update_json_column<T: Serialize>(
        &self,
        id: &SessionId,
        column: &'static str,
        value: &T,
    ) -> Result<bool, StoreError> {
        let json = to_json(value)?;
        let sql = format!("UPDATE sessions SET {column} = ?2, updated_at = ?3 WHERE session_id = ?1");
        let result = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(json)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE {column}: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Storage(format!("serialization: {e}")))
}

fn from_json<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StoreError::QueryFailed(format!("{column} column: {e}")))
}

fn parse_time(column: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn parse_opt_time(column: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(|r| parse_time(column, r)).transpose()
}

fn row_to_message(row: &SqliteRow) -> Result<Message, StoreError> {
    let role: String = get(row, "role")?;
    let metadata: String = get(row, "metadata")?;
    let timestamp: String = get(row, "timestamp")?;
    Ok(Message {
        id: get(row, "id")?,
        role: Role::from_str(&role).map_err(StoreError::Corrupt)?,
        content: get(row, "content")?,
        metadata: from_json::<MessageMetadata>("metadata", &metadata)?,
        timestamp: parse_time("timestamp", &timestamp)?,
    })
}

fn row_to_session(row: &SqliteRow, messages: Vec<Message>) -> Result<Session, StoreError> {
    let context: String = get(row, "context")?;
    let state: String = get(row, "state")?;
    let status: String = get(row, "status")?;
    let feedback: Option<String> = get(row, "feedback")?;
    let created_at: String = get(row, "created_at")?;
    let updated_at: String = get(row, "updated_at")?;

    Ok(Session {
        session_id: SessionId(get(row, "session_id")?),
        user_id: get(row, "user_id")?,
        context: from_json("context", &context)?,
        state: from_json("state", &state)?,
        messages,
        status: SessionStatus::from_str(&status).map_err(StoreError::Corrupt)?,
        feedback: feedback.as_deref().map(|f| from_json("feedback", f)).transpose()?,
        created_at: parse_time("created_at", &created_at)?,
        updated_at: parse_time("updated_at", &updated_at)?,
        ended_at: parse_opt_time("ended_at", get(row, "ended_at")?)?,
        duration_ms: get(row, "duration_ms")?,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<KnowledgeEntry, StoreError> {
    let category: String = get(row, "category")?;
    let status: String = get(row, "status")?;
    let tags: String = get(row, "tags")?;
    let keywords: String = get(row, "keywords")?;
    let embedding: Option<Vec<u8>> = get(row, "embedding")?;
    let access_count: i64 = get(row, "access_count")?;
    let effectiveness: f64 = get(row, "effectiveness")?;

    Ok(KnowledgeEntry {
        id: get(row, "id")?,
        title: get(row, "title")?,
        content: get(row, "content")?,
        category: KnowledgeCategory::from_str(&category).map_err(StoreError::Corrupt)?,
        tags: from_json("tags", &tags)?,
        keywords: from_json("keywords", &keywords)?,
        embedding: embedding.as_deref().map(SqliteStore::blob_to_embedding),
        usage: KnowledgeUsage {
            access_count: u64::try_from(access_count).unwrap_or(0),
            last_accessed_at: parse_opt_time("last_accessed_at", get(row, "last_accessed_at")?)?,
            effectiveness: effectiveness as f32,
        },
        status: KnowledgeStatus::from_str(&status).map_err(StoreError::Corrupt)?,
        score: 0.0,
    })
}

#[async_trait]
impl SessionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, context, state, status, feedback,
                                  created_at, updated_at, ended_at, duration_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(session.session_id.as_str())
        .bind(&session.user_id)
        .bind(to_json(&session.context)?)
        .bind(to_json(&session.state)?)
        .bind(session.status.as_str())
        .bind(session.feedback.as_ref().map(to_json).transpose()?)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .bind(session.ended_at.map(|t| t.to_rfc3339()))
        .bind(session.duration_ms)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                StoreError::Conflict(format!("session {}", session.session_id))
            }
            _ => StoreError::Storage(format!("INSERT session: {e}")),
        })?;

        for message in &session.messages {
            insert_message(&mut tx, &session.session_id, message).await?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        debug!(session_id = %session.session_id, "Inserted session");
        Ok(())
    }

    async fn find(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("find session: {e}")))?;

        match row {
            Some(ref r) => {
                let messages = self.load_messages(id, 0, usize::MAX).await?;
                Ok(Some(row_to_session(r, messages)?))
            }
            None => Ok(None),
        }
    }

    async fn append_message(&self, id: &SessionId, message: &Message) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        let touched = sqlx::query("UPDATE sessions SET updated_at = ?2 WHERE session_id = ?1")
            .bind(id.as_str())
            .bind(message.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("touch session: {e}")))?;
        if touched.rows_affected() == 0 {
            return Ok(false);
        }

        insert_message(&mut tx, id, message).await?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        Ok(true)
    }

    async fn update_state(&self, id: &SessionId, state: &SessionState) -> Result<bool, StoreError> {
        self.update_json_column(id, "state", state).await
    }

    async fn update_context(&self, id: &SessionId, context: &SessionContext) -> Result<bool, StoreError> {
        self.update_json_column(id, "context", context).await
    }

    async fn update_status(&self, id: &SessionId, update: &StatusUpdate) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET status = ?2, updated_at = ?3, ended_at = ?4, duration_ms = ?5 \
             WHERE session_id = ?1 AND status = 'active'",
        )
        .bind(id.as_str())
        .bind(update.status.as_str())
        .bind(update.at.to_rfc3339())
        .bind(update.ended_at.map(|t| t.to_rfc3339()))
        .bind(update.duration_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE status: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_feedback(&self, id: &SessionId, feedback: &Feedback) -> Result<bool, StoreError> {
        self.update_json_column(id, "feedback", feedback).await
    }

    async fn messages(
        &self,
        id: &SessionId,
        offset: usize,
        limit: usize,
    ) -> Result<Option<MessageSlice>, StoreError> {
        if !self.session_exists(id).await? {
            return Ok(None);
        }

        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM session_messages WHERE session_id = ?1")
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT messages: {e}")))?;
        let total: i64 = get(&row, "cnt")?;

        Ok(Some(MessageSlice {
            messages: self.load_messages(id, offset, limit).await?,
            total: usize::try_from(total).unwrap_or(0),
        }))
    }
}

async fn insert_message(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: &SessionId,
    message: &Message,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO session_messages (session_id, id, role, content, metadata, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(id.as_str())
    .bind(&message.id)
    .bind(message.role.as_str())
    .bind(&message.content)
    .bind(to_json(&message.metadata)?)
    .bind(message.timestamp.to_rfc3339())
    .execute(&mut **tx)
    .await
    .map_err(|e| StoreError::Storage(format!("INSERT message: {e}")))?;
    Ok(())
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, mut entry: KnowledgeEntry) -> Result<String, StoreError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }

        sqlx::query(
            r#"
            INSERT INTO knowledge (id, title, content, category, tags, keywords, embedding,
                                   access_count, last_accessed_at, effectiveness, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.title)
        .bind(&entry.content)
        .bind(entry.category.as_str())
        .bind(to_json(&entry.tags)?)
        .bind(to_json(&entry.keywords)?)
        .bind(entry.embedding.as_deref().map(Self::embedding_to_blob))
        .bind(i64::try_from(entry.usage.access_count).unwrap_or(i64::MAX))
        .bind(entry.usage.last_accessed_at.map(|t| t.to_rfc3339()))
        .bind(f64::from(entry.usage.effectiveness))
        .bind(entry.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => StoreError::Conflict(format!("knowledge entry {}", entry.id)),
            _ => StoreError::Storage(format!("INSERT knowledge: {e}")),
        })?;

        debug!(id = %entry.id, title = %entry.title, "Stored knowledge entry");
        Ok(entry.id)
    }

    async fn get(&self, id: &str) -> Result<Option<KnowledgeEntry>, StoreError> {
        let row = sqlx::query("SELECT * FROM knowledge WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET knowledge: {e}")))?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn search(&self, query: &KnowledgeQuery) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let fts_query = Self::sanitize_fts_query(&query.text);
        if fts_query.is_empty() {
            return Ok(vec![]);
        }

        // bm25 weights: title, content, keywords. Lower is better.
        let rows = sqlx::query(
            r#"
            SELECT k.*, bm25(knowledge_fts, 10.0, 1.0, 5.0) AS rank
            FROM knowledge_fts f
            JOIN knowledge k ON k.iid = f.rowid
            WHERE knowledge_fts MATCH ?1
              AND k.status = 'active'
              AND (?2 IS NULL OR k.category = ?2)
            ORDER BY rank
            LIMIT ?3
            "#,
        )
        .bind(&fts_query)
        .bind(query.category.map(|c| c.as_str()))
        .bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("FTS5 search: {e}")))?;

        rows.iter()
            .map(|row| {
                let mut entry = row_to_entry(row)?;
                let rank: f64 = row.try_get("rank").unwrap_or(0.0);
                entry.score = (-rank) as f32;
                Ok(entry)
            })
            .collect()
    }

    async fn embedded(&self) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let rows = sqlx::query("SELECT * FROM knowledge WHERE status = 'active' AND embedding IS NOT NULL")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("embedding scan: {e}")))?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE knowledge SET access_count = access_count + 1, last_accessed_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("record access: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_status(&self, id: &str, status: KnowledgeStatus) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE knowledge SET status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("set status: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM knowledge")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT: {e}")))?;
        let cnt: i64 = get(&row, "cnt")?;
        Ok(usize::try_from(cnt).unwrap_or(0))
    }
}
