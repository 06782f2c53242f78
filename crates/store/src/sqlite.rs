//! SQLite store.
//!
//! Two tables, both keyed by user:
//! - `branches` — one row per SubChat branch, turns as a JSON column
//! - `knowledge` — one row per (scope, record); the conversation scope and the
//!   cross-conversation index are the same table distinguished by `scope`
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (nanosecond
//! precision, `Z` suffix) so that lexical order equals time order.
//! `put_knowledge` runs in a single transaction behind an in-process write
//! lock, making the cross-conversation append-and-cap atomic.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sidechat_core::branch::{BranchState, SubChatBranch};
use sidechat_core::error::StoreError;
use sidechat_core::knowledge::{KnowledgeScope, MergedKnowledge};
use sidechat_core::message::{BranchId, ConversationId, KnowledgeId, Turn, UserId};
use sidechat_core::retention::RetentionPolicy;
use sidechat_core::store::{BranchStore, SweepReport, WriteReport};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const CONVERSATION: &str = "conversation";
const CROSS: &str = "cross_conversation";

/// A durable SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Unavailable(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// An ephemeral in-process database on a single pinned connection.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Unavailable(format!("Invalid SQLite path: {e}")))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open SQLite: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS branches (
                user_id                TEXT NOT NULL,
                id                     TEXT NOT NULL,
                conversation_id        TEXT NOT NULL,
                parent_message_id      TEXT NOT NULL,
                parent_message_content TEXT NOT NULL DEFAULT '',
                selected_text          TEXT NOT NULL DEFAULT '',
                turns                  TEXT NOT NULL DEFAULT '[]',
                state                  TEXT NOT NULL,
                continued_from         TEXT,
                created_at             TEXT NOT NULL,
                updated_at             TEXT NOT NULL,
                PRIMARY KEY (user_id, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("branches table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS knowledge (
                user_id           TEXT NOT NULL,
                scope             TEXT NOT NULL,
                id                TEXT NOT NULL,
                conversation_id   TEXT NOT NULL,
                parent_message_id TEXT NOT NULL,
                source_branch_id  TEXT NOT NULL,
                selected_text     TEXT NOT NULL DEFAULT '',
                short_summary     TEXT NOT NULL,
                detailed_summary  TEXT NOT NULL,
                topic             TEXT NOT NULL,
                question_count    INTEGER NOT NULL,
                merged_at         TEXT NOT NULL,
                fallback          INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, scope, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("knowledge table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_branches_conversation ON branches(user_id, conversation_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("branches index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_knowledge_scope ON knowledge(user_id, scope, conversation_id, merged_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("knowledge index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_branch(row: &SqliteRow) -> Result<SubChatBranch, StoreError> {
        let turns_json: String = column(row, "turns")?;
        let turns: Vec<Turn> = serde_json::from_str(&turns_json)
            .map_err(|e| StoreError::Serialization(format!("turns column: {e}")))?;
        let state: String = column(row, "state")?;
        let state = BranchState::from_str(&state).map_err(StoreError::QueryFailed)?;
        let continued_from: Option<String> = column(row, "continued_from")?;

        Ok(SubChatBranch {
            id: BranchId(column(row, "id")?),
            conversation_id: ConversationId(column(row, "conversation_id")?),
            parent_message_id: column(row, "parent_message_id")?,
            parent_message_content: column(row, "parent_message_content")?,
            selected_text: column(row, "selected_text")?,
            turns,
            state,
            continued_from: continued_from.map(KnowledgeId),
            created_at: parse_time(&column::<String>(row, "created_at")?)?,
            updated_at: parse_time(&column::<String>(row, "updated_at")?)?,
        })
    }

    fn row_to_knowledge(row: &SqliteRow) -> Result<MergedKnowledge, StoreError> {
        let question_count: i64 = column(row, "question_count")?;
        Ok(MergedKnowledge {
            id: KnowledgeId(column(row, "id")?),
            conversation_id: ConversationId(column(row, "conversation_id")?),
            parent_message_id: column(row, "parent_message_id")?,
            source_branch_id: BranchId(column(row, "source_branch_id")?),
            selected_text: column(row, "selected_text")?,
            short_summary: column(row, "short_summary")?,
            detailed_summary: column(row, "detailed_summary")?,
            topic: column(row, "topic")?,
            question_count: usize::try_from(question_count).unwrap_or(0),
            merged_at: parse_time(&column::<String>(row, "merged_at")?)?,
            fallback: column(row, "fallback")?,
        })
    }

    async fn insert_knowledge(
        conn: &mut sqlx::SqliteConnection,
        user: &UserId,
        scope: KnowledgeScope,
        k: &MergedKnowledge,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO knowledge
                (user_id, scope, id, conversation_id, parent_message_id, source_branch_id,
                 selected_text, short_summary, detailed_summary, topic, question_count,
                 merged_at, fallback)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.as_str())
        .bind(scope.as_str())
        .bind(k.id.as_str())
        .bind(k.conversation_id.as_str())
        .bind(&k.parent_message_id)
        .bind(k.source_branch_id.as_str())
        .bind(&k.selected_text)
        .bind(&k.short_summary)
        .bind(&k.detailed_summary)
        .bind(&k.topic)
        .bind(i64::try_from(k.question_count).unwrap_or(i64::MAX))
        .bind(format_time(k.merged_at))
        .bind(k.fallback)
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert knowledge: {e}")))?;
        Ok(result.rows_affected() == 1)
    }

    /// Delete expired rows, restricted to one user when `user` is set.
    async fn sweep(
        conn: &mut sqlx::SqliteConnection,
        user: Option<&UserId>,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, StoreError> {
        let cutoff = format_time(now - policy.max_age());
        let mut report = SweepReport::default();

        let mut scopes = vec![CROSS];
        if policy.purge_conversation_scope {
            scopes.push(CONVERSATION);
        }

        for scope in scopes {
            let result = match user {
                Some(user) => sqlx::query(
                    "DELETE FROM knowledge WHERE user_id = ? AND scope = ? AND merged_at < ?",
                )
                .bind(user.as_str())
                .bind(scope)
                .bind(&cutoff)
                .execute(&mut *conn)
                .await,
                None => sqlx::query("DELETE FROM knowledge WHERE scope = ? AND merged_at < ?")
                    .bind(scope)
                    .bind(&cutoff)
                    .execute(&mut *conn)
                    .await,
            }
            .map_err(|e| StoreError::QueryFailed(format!("expiry sweep: {e}")))?;

            let removed = usize::try_from(result.rows_affected()).unwrap_or(usize::MAX);
            if scope == CROSS {
                report.cross_conversation_removed = removed;
            } else {
                report.conversation_removed = removed;
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl BranchStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_branch(
        &self,
        user: &UserId,
        id: &BranchId,
    ) -> Result<Option<SubChatBranch>, StoreError> {
        let row = sqlx::query("SELECT * FROM branches WHERE user_id = ? AND id = ?")
            .bind(user.as_str())
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get branch: {e}")))?;
        row.as_ref().map(Self::row_to_branch).transpose()
    }

    async fn put_branch(&self, user: &UserId, branch: SubChatBranch) -> Result<(), StoreError> {
        let turns = serde_json::to_string(&branch.turns)
            .map_err(|e| StoreError::Serialization(format!("turns: {e}")))?;
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO branches
                (user_id, id, conversation_id, parent_message_id, parent_message_content,
                 selected_text, turns, state, continued_from, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.as_str())
        .bind(branch.id.as_str())
        .bind(branch.conversation_id.as_str())
        .bind(&branch.parent_message_id)
        .bind(&branch.parent_message_content)
        .bind(&branch.selected_text)
        .bind(turns)
        .bind(branch.state.as_str())
        .bind(branch.continued_from.as_ref().map(|k| k.0.clone()))
        .bind(format_time(branch.created_at))
        .bind(format_time(branch.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("put branch: {e}")))?;
        Ok(())
    }

    async fn list_branches(
        &self,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Result<Vec<SubChatBranch>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM branches WHERE user_id = ? AND conversation_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(user.as_str())
        .bind(conversation.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list branches: {e}")))?;
        rows.iter().map(Self::row_to_branch).collect()
    }

    async fn get_knowledge(
        &self,
        user: &UserId,
        id: &KnowledgeId,
    ) -> Result<Option<MergedKnowledge>, StoreError> {
        // prefer the conversation-scoped row; the index holds an identical copy
        let row = sqlx::query(
            "SELECT * FROM knowledge WHERE user_id = ? AND id = ? ORDER BY scope = 'conversation' DESC LIMIT 1",
        )
        .bind(user.as_str())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("get knowledge: {e}")))?;
        row.as_ref().map(Self::row_to_knowledge).transpose()
    }

    async fn put_knowledge(
        &self,
        user: &UserId,
        knowledge: MergedKnowledge,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<WriteReport, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Unavailable(format!("begin transaction: {e}")))?;

        Self::insert_knowledge(&mut tx, user, KnowledgeScope::Conversation, &knowledge).await?;
        let indexed =
            Self::insert_knowledge(&mut tx, user, KnowledgeScope::CrossConversation, &knowledge)
                .await?;

        let swept = Self::sweep(&mut tx, Some(user), policy, now).await?;

        let overflow: Vec<String> = sqlx::query(
            r#"
            SELECT id FROM knowledge
            WHERE user_id = ? AND scope = ?
            ORDER BY merged_at DESC, id ASC
            LIMIT -1 OFFSET ?
            "#,
        )
        .bind(user.as_str())
        .bind(CROSS)
        .bind(i64::try_from(policy.max_cross_conversation).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("select overflow: {e}")))?
        .iter()
        .map(|row| column::<String>(row, "id"))
        .collect::<Result<_, _>>()?;

        for id in &overflow {
            sqlx::query("DELETE FROM knowledge WHERE user_id = ? AND scope = ? AND id = ?")
                .bind(user.as_str())
                .bind(CROSS)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("evict overflow: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Unavailable(format!("commit: {e}")))?;

        Ok(WriteReport {
            indexed,
            evicted: overflow.into_iter().map(KnowledgeId).collect(),
            expired: swept.total(),
        })
    }

    async fn list_by_conversation(
        &self,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Result<Vec<MergedKnowledge>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM knowledge WHERE user_id = ? AND scope = ? AND conversation_id = ?",
        )
        .bind(user.as_str())
        .bind(CONVERSATION)
        .bind(conversation.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list conversation knowledge: {e}")))?;
        rows.iter().map(Self::row_to_knowledge).collect()
    }

    async fn list_cross_conversation(
        &self,
        user: &UserId,
    ) -> Result<Vec<MergedKnowledge>, StoreError> {
        let rows = sqlx::query("SELECT * FROM knowledge WHERE user_id = ? AND scope = ?")
            .bind(user.as_str())
            .bind(CROSS)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("list cross-conversation: {e}")))?;
        rows.iter().map(Self::row_to_knowledge).collect()
    }

    async fn delete_expired(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StoreError::Unavailable(format!("acquire connection: {e}")))?;
        Self::sweep(&mut conn, None, policy, now).await
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("timestamp '{s}': {e}")))
}
