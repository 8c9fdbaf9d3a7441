//! Semantic retrieval: embed the query, rank against the index, apply the
//! relevance floor.

use std::sync::Arc;

use crate::errors::BotError;
use crate::llm::Embedder;

use super::store::{RetrievalResult, VectorStore};

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Top-k chunks scoring at least `min_score` against `query_text`.
    ///
    /// An empty result is a normal outcome (empty index, nothing clears
    /// the floor), not an error. Callers decide what degraded means.
    pub async fn retrieve(
        &self,
        query_text: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<RetrievalResult, BotError> {
        let embeddings = self.embedder.embed(&[query_text.to_string()]).await?;
        let Some(query_vector) = embeddings.first() else {
            return Ok(Vec::new());
        };

        let mut results = self.store.query(query_vector, top_k).await?;
        results.retain(|hit| hit.score >= min_score);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::sqlite::SqliteVectorStore;
    use crate::rag::store::Chunk;
    use async_trait::async_trait;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, BotError> {
            // Project onto two topic axes by keyword.
            Ok(inputs
                .iter()
                .map(|text| {
                    let hours = if text.contains("hours") { 1.0 } else { 0.0 };
                    let returns = if text.contains("return") { 1.0 } else { 0.0 };
                    vec![hours, returns]
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, BotError> {
            Err(BotError::EmbeddingUnavailable("down".to_string()))
        }
    }

    async fn seeded_store() -> Arc<SqliteVectorStore> {
        let tmp = std::env::temp_dir().join(format!(
            "concierge-retriever-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        let store = SqliteVectorStore::with_path(tmp).await.unwrap();
        store
            .upsert(&[
                Chunk {
                    id: "h".to_string(),
                    text: "We are open 9-5 on weekdays.".to_string(),
                    source_ref: "faq".to_string(),
                    sequence_index: 0,
                    start_offset: 0,
                    embedding: Some(vec![1.0, 0.0]),
                },
                Chunk {
                    id: "r".to_string(),
                    text: "Returns accepted within 30 days.".to_string(),
                    source_ref: "faq".to_string(),
                    sequence_index: 1,
                    start_offset: 30,
                    embedding: Some(vec![0.0, 1.0]),
                },
            ])
            .await
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn retrieves_matching_chunk_above_floor() {
        let retriever = Retriever::new(Arc::new(AxisEmbedder), seeded_store().await);

        let results = retriever
            .retrieve("what are your hours", 5, 0.5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "h");
    }

    #[tokio::test]
    async fn floor_filters_everything_without_error() {
        let retriever = Retriever::new(Arc::new(AxisEmbedder), seeded_store().await);

        // Query matches no axis: every score is 0.0, below the floor.
        let results = retriever
            .retrieve("unrelated question", 5, 0.5)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn embedder_failure_propagates() {
        let retriever = Retriever::new(Arc::new(FailingEmbedder), seeded_store().await);
        let err = retriever.retrieve("anything", 5, 0.0).await.unwrap_err();
        assert!(matches!(err, BotError::EmbeddingUnavailable(_)));
    }
}
