//! SQLite-backed vector index.
//!
//! Chunk metadata lives in SQLite; similarity search is brute-force
//! cosine over the stored embeddings. Fine for knowledge bases in the
//! tens of thousands of chunks, and it keeps the index a single file.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{rank_results, Chunk, RetrievalResult, ScoredChunk, VectorStore};
use crate::errors::BotError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, BotError> {
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
            .map_err(|e| BotError::IndexUnavailable(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), BotError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source_ref TEXT NOT NULL,
                sequence_index INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(index_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_ref)")
            .execute(&self.pool)
            .await
            .map_err(index_err)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
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
            (dot / denom).clamp(-1.0, 1.0)
        }
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
        let embedding_bytes: Vec<u8> = row.get("embedding");
        Chunk {
            id: row.get("id"),
            text: row.get("text"),
            source_ref: row.get("source_ref"),
            sequence_index: row.get::<i64, _>("sequence_index") as usize,
            start_offset: row.get::<i64, _>("start_offset") as usize,
            embedding: Some(Self::deserialize_embedding(&embedding_bytes)),
        }
    }

    fn embedding_blob(chunk: &Chunk) -> Result<Vec<u8>, BotError> {
        let embedding = chunk.embedding.as_deref().ok_or_else(|| {
            BotError::Internal(format!("chunk {} has no embedding", chunk.id))
        })?;
        Ok(Self::serialize_embedding(embedding))
    }
}

fn index_err(err: sqlx::Error) -> BotError {
    BotError::IndexUnavailable(err.to_string())
}

const INSERT_CHUNK: &str = "INSERT OR REPLACE INTO chunks
    (id, source_ref, sequence_index, start_offset, text, embedding)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<(), BotError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(index_err)?;

        for chunk in chunks {
            let blob = Self::embedding_blob(chunk)?;
            sqlx::query(INSERT_CHUNK)
                .bind(&chunk.id)
                .bind(&chunk.source_ref)
                .bind(chunk.sequence_index as i64)
                .bind(chunk.start_offset as i64)
                .bind(&chunk.text)
                .bind(&blob)
                .execute(&mut *tx)
                .await
                .map_err(index_err)?;
        }

        tx.commit().await.map_err(index_err)?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<RetrievalResult, BotError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, source_ref, sequence_index, start_offset, text, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(index_err)?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let chunk = Self::row_to_chunk(row);
                let score = chunk
                    .embedding
                    .as_deref()
                    .map(|emb| Self::cosine_similarity(vector, emb))
                    .unwrap_or(0.0);
                ScoredChunk { chunk, score }
            })
            .collect();

        rank_results(&mut scored);
        scored.truncate(top_k);

        Ok(scored)
    }

    async fn delete_by_source(&self, source_ref: &str) -> Result<usize, BotError> {
        let result = sqlx::query("DELETE FROM chunks WHERE source_ref = ?1")
            .bind(source_ref)
            .execute(&self.pool)
            .await
            .map_err(index_err)?;

        Ok(result.rows_affected() as usize)
    }

    async fn replace_source(&self, source_ref: &str, chunks: &[Chunk]) -> Result<(), BotError> {
        let mut tx = self.pool.begin().await.map_err(index_err)?;

        sqlx::query("DELETE FROM chunks WHERE source_ref = ?1")
            .bind(source_ref)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;

        for chunk in chunks {
            let blob = Self::embedding_blob(chunk)?;
            sqlx::query(INSERT_CHUNK)
                .bind(&chunk.id)
                .bind(&chunk.source_ref)
                .bind(chunk.sequence_index as i64)
                .bind(chunk.start_offset as i64)
                .bind(&chunk.text)
                .bind(&blob)
                .execute(&mut *tx)
                .await
                .map_err(index_err)?;
        }

        tx.commit().await.map_err(index_err)?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, BotError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(index_err)?;

        Ok(count as usize)
    }

    async fn clear(&self) -> Result<usize, BotError> {
        let result = sqlx::query("DELETE FROM chunks")
            .execute(&self.pool)
            .await
            .map_err(index_err)?;

        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteVectorStore {
        let tmp = std::env::temp_dir().join(format!(
            "concierge-index-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        SqliteVectorStore::with_path(tmp).await.unwrap()
    }

    fn make_chunk(id: &str, text: &str, source: &str, seq: usize, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            source_ref: source.to_string(),
            sequence_index: seq,
            start_offset: seq * 10,
            embedding: Some(embedding),
        }
    }

    #[tokio::test]
    async fn upsert_and_query() {
        let store = test_store().await;

        store
            .upsert(&[
                make_chunk("c1", "store hours", "faq", 0, vec![1.0, 0.0, 0.0]),
                make_chunk("c2", "return policy", "faq", 1, vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let results = store.query(&[1.0, 0.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "c1");
        assert!(results[0].score > 0.99);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn upsert_same_id_overwrites() {
        let store = test_store().await;

        store
            .upsert(&[make_chunk("c1", "old text", "faq", 0, vec![1.0])])
            .await
            .unwrap();
        store
            .upsert(&[make_chunk("c1", "new text", "faq", 0, vec![1.0])])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let results = store.query(&[1.0], 1).await.unwrap();
        assert_eq!(results[0].chunk.text, "new text");
    }

    #[tokio::test]
    async fn query_respects_top_k_and_tie_order() {
        let store = test_store().await;

        // Identical embeddings: ties must break by sequence index.
        store
            .upsert(&[
                make_chunk("c3", "three", "doc", 2, vec![1.0, 0.0]),
                make_chunk("c1", "one", "doc", 0, vec![1.0, 0.0]),
                make_chunk("c2", "two", "doc", 1, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "c1");
        assert_eq!(results[1].chunk.id, "c2");
    }

    #[tokio::test]
    async fn query_empty_index_returns_empty() {
        let store = test_store().await;
        let results = store.query(&[1.0, 0.0], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn replace_source_swaps_without_duplicating() {
        let store = test_store().await;

        store
            .upsert(&[
                make_chunk("a1", "alpha", "doc-a", 0, vec![1.0]),
                make_chunk("b1", "beta", "doc-b", 0, vec![1.0]),
            ])
            .await
            .unwrap();

        store
            .replace_source(
                "doc-a",
                &[
                    make_chunk("a1", "alpha v2", "doc-a", 0, vec![1.0]),
                    make_chunk("a2", "alpha extra", "doc-a", 1, vec![1.0]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 3);

        // Replaying the same replacement changes nothing.
        store
            .replace_source(
                "doc-a",
                &[
                    make_chunk("a1", "alpha v2", "doc-a", 0, vec![1.0]),
                    make_chunk("a2", "alpha extra", "doc-a", 1, vec![1.0]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_by_source_and_clear() {
        let store = test_store().await;

        store
            .upsert(&[
                make_chunk("a1", "alpha", "doc-a", 0, vec![1.0]),
                make_chunk("a2", "alpha two", "doc-a", 1, vec![1.0]),
                make_chunk("b1", "beta", "doc-b", 0, vec![1.0]),
            ])
            .await
            .unwrap();

        let deleted = store.delete_by_source("doc-a").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count().await.unwrap(), 1);

        let cleared = store.clear().await.unwrap();
        assert_eq!(cleared, 1);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
