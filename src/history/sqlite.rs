//! Durable conversation backing over SQLite. WAL mode keeps it usable
//! from several server processes sharing one database file.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::errors::BotError;

use super::{ConversationStore, Role, Turn};

pub struct SqliteConversationStore {
    pool: SqlitePool,
    max_turns: usize,
}

impl SqliteConversationStore {
    pub async fn with_path(db_path: PathBuf, max_turns: usize) -> Result<Self, BotError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(BotError::internal)?;

        let store = Self { pool, max_turns };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), BotError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversant_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(BotError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_turns_conversant_id ON turns(conversant_id, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(BotError::internal)?;

        Ok(())
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, BotError> {
        let role: String = row.get("role");
        let role = match role.as_str() {
            "assistant" => Role::Assistant,
            _ => Role::User,
        };
        let created_at: String = row.get("created_at");
        let timestamp = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(BotError::internal)?;

        Ok(Turn {
            role,
            text: row.get("content"),
            timestamp,
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn append(&self, conversant_id: &str, turn: Turn) -> Result<(), BotError> {
        let mut tx = self.pool.begin().await.map_err(BotError::internal)?;

        sqlx::query(
            "INSERT INTO turns (conversant_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(conversant_id)
        .bind(turn.role.as_str())
        .bind(&turn.text)
        .bind(turn.timestamp.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(BotError::internal)?;

        // Enforce the bound in the same transaction as the insert.
        sqlx::query(
            "DELETE FROM turns
             WHERE conversant_id = ?1
               AND id NOT IN (
                   SELECT id FROM turns
                   WHERE conversant_id = ?1
                   ORDER BY id DESC
                   LIMIT ?2
               )",
        )
        .bind(conversant_id)
        .bind(self.max_turns as i64)
        .execute(&mut *tx)
        .await
        .map_err(BotError::internal)?;

        tx.commit().await.map_err(BotError::internal)?;
        Ok(())
    }

    async fn history(&self, conversant_id: &str) -> Result<Vec<Turn>, BotError> {
        let rows = sqlx::query(
            "SELECT role, content, created_at
             FROM (
                 SELECT id, role, content, created_at
                 FROM turns
                 WHERE conversant_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2
             )
             ORDER BY id ASC",
        )
        .bind(conversant_id)
        .bind(self.max_turns as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(BotError::internal)?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn clear(&self, conversant_id: &str) -> Result<(), BotError> {
        sqlx::query("DELETE FROM turns WHERE conversant_id = ?1")
            .bind(conversant_id)
            .execute(&self.pool)
            .await
            .map_err(BotError::internal)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store(max_turns: usize) -> SqliteConversationStore {
        let tmp = std::env::temp_dir().join(format!(
            "concierge-history-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        SqliteConversationStore::with_path(tmp, max_turns)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn append_and_read_in_order() {
        let store = test_store(10).await;

        store.append("c1", Turn::user("hello")).await.unwrap();
        store.append("c1", Turn::assistant("hi there")).await.unwrap();

        let history = store.history("c1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].text, "hello");
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn bound_is_enforced_at_append() {
        let store = test_store(10).await;

        for i in 1..=12 {
            store
                .append("c1", Turn::user(format!("message {}", i)))
                .await
                .unwrap();
        }

        let history = store.history("c1").await.unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].text, "message 3");
        assert_eq!(history[9].text, "message 12");
    }

    #[tokio::test]
    async fn clear_removes_session() {
        let store = test_store(5).await;

        store.append("c1", Turn::user("hello")).await.unwrap();
        store.append("c2", Turn::user("other")).await.unwrap();
        store.clear("c1").await.unwrap();

        assert!(store.history("c1").await.unwrap().is_empty());
        assert_eq!(store.history("c2").await.unwrap().len(), 1);
    }
}
