//! Response orchestration: one inbound message in, one reply out.
//!
//! Each exchange walks Received → Retrieving → Composing → Generating →
//! Persisting → Completed. Retrieval failures degrade to an empty context;
//! generation failures retry with backoff and then fall back to a static
//! reply, so the conversant always hears something.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::errors::BotError;
use crate::history::{ConversationStore, Turn};
use crate::llm::{ChatModel, ChatRequest};
use crate::prompt::PromptComposer;
use crate::rag::Retriever;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExchangeState {
    Received,
    Retrieving,
    Composing,
    Generating,
    Persisting,
    Completed,
    Failed,
}

fn transition(state: &mut ExchangeState, next: ExchangeState) {
    tracing::debug!(from = ?state, to = ?next, "exchange state");
    *state = next;
}

/// Per-conversant serialization points. Entries are retained for the life
/// of the process.
struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    async fn get(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().await;
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeOptions {
    pub top_k: usize,
    pub min_score: f32,
    pub temperature: f64,
    pub max_tokens: u32,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub fallback_reply: String,
}

pub struct ResponseOrchestrator {
    retriever: Retriever,
    composer: PromptComposer,
    model: Arc<dyn ChatModel>,
    conversations: Arc<dyn ConversationStore>,
    options: ExchangeOptions,
    locks: KeyedLocks,
}

impl ResponseOrchestrator {
    pub fn new(
        retriever: Retriever,
        composer: PromptComposer,
        model: Arc<dyn ChatModel>,
        conversations: Arc<dyn ConversationStore>,
        options: ExchangeOptions,
    ) -> Self {
        Self {
            retriever,
            composer,
            model,
            conversations,
            options,
            locks: KeyedLocks::new(),
        }
    }

    /// Run one exchange for `conversant_id`. Exchanges for the same
    /// conversant are serialized; different conversants proceed
    /// concurrently.
    pub async fn handle_message(
        &self,
        conversant_id: &str,
        message_text: &str,
    ) -> Result<String, BotError> {
        let mut state = ExchangeState::Received;

        let message = message_text.trim();
        if message.is_empty() {
            transition(&mut state, ExchangeState::Failed);
            return Err(BotError::EmptyMessage);
        }

        // Held across composing and persisting so concurrent exchanges for
        // one conversant cannot interleave their history appends.
        let lock = self.locks.get(conversant_id).await;
        let _guard = lock.lock().await;

        transition(&mut state, ExchangeState::Retrieving);
        let retrieval = match self
            .retriever
            .retrieve(message, self.options.top_k, self.options.min_score)
            .await
        {
            Ok(hits) => hits,
            Err(err @ (BotError::IndexUnavailable(_) | BotError::EmbeddingUnavailable(_))) => {
                tracing::warn!(
                    conversant = conversant_id,
                    error = %err,
                    "retrieval degraded; continuing without knowledge-base context"
                );
                Vec::new()
            }
            Err(other) => {
                transition(&mut state, ExchangeState::Failed);
                return Err(other);
            }
        };

        transition(&mut state, ExchangeState::Composing);
        let history = self.conversations.history(conversant_id).await?;
        let mut request = self.composer.compose(&retrieval, &history, message);
        request.temperature = Some(self.options.temperature);
        request.max_tokens = Some(self.options.max_tokens);

        transition(&mut state, ExchangeState::Generating);
        let reply = match self.generate_with_retry(request).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(
                    conversant = conversant_id,
                    error = %err,
                    "generation exhausted retries; sending fallback reply"
                );
                self.options.fallback_reply.clone()
            }
        };

        transition(&mut state, ExchangeState::Persisting);
        self.conversations
            .append(conversant_id, Turn::user(message))
            .await?;
        self.conversations
            .append(conversant_id, Turn::assistant(reply.clone()))
            .await?;

        transition(&mut state, ExchangeState::Completed);
        Ok(reply)
    }

    async fn generate_with_retry(&self, request: ChatRequest) -> Result<String, BotError> {
        let mut delay = self.options.retry_base_delay;
        let mut attempt = 1;
        loop {
            match self.model.generate(request.clone()).await {
                Ok(text) => return Ok(text),
                Err(err @ (BotError::GenerationUnavailable(_) | BotError::GenerationTimeout)) => {
                    if attempt >= self.options.retry_max_attempts {
                        return Err(err);
                    }
                    tracing::warn!(attempt, error = %err, "generation failed; backing off");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryConversationStore;
    use crate::llm::Embedder;
    use crate::rag::store::{Chunk, RetrievalResult, VectorStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, BotError> {
            Ok(inputs.iter().map(|_| vec![1.0]).collect())
        }
    }

    struct EmptyIndex;

    #[async_trait]
    impl VectorStore for EmptyIndex {
        async fn upsert(&self, _chunks: &[Chunk]) -> Result<(), BotError> {
            Ok(())
        }
        async fn query(&self, _v: &[f32], _k: usize) -> Result<RetrievalResult, BotError> {
            Ok(Vec::new())
        }
        async fn delete_by_source(&self, _s: &str) -> Result<usize, BotError> {
            Ok(0)
        }
        async fn replace_source(&self, _s: &str, _c: &[Chunk]) -> Result<(), BotError> {
            Ok(())
        }
        async fn count(&self) -> Result<usize, BotError> {
            Ok(0)
        }
        async fn clear(&self) -> Result<usize, BotError> {
            Ok(0)
        }
    }

    struct DownIndex;

    #[async_trait]
    impl VectorStore for DownIndex {
        async fn upsert(&self, _chunks: &[Chunk]) -> Result<(), BotError> {
            Err(BotError::IndexUnavailable("down".to_string()))
        }
        async fn query(&self, _v: &[f32], _k: usize) -> Result<RetrievalResult, BotError> {
            Err(BotError::IndexUnavailable("down".to_string()))
        }
        async fn delete_by_source(&self, _s: &str) -> Result<usize, BotError> {
            Err(BotError::IndexUnavailable("down".to_string()))
        }
        async fn replace_source(&self, _s: &str, _c: &[Chunk]) -> Result<(), BotError> {
            Err(BotError::IndexUnavailable("down".to_string()))
        }
        async fn count(&self) -> Result<usize, BotError> {
            Err(BotError::IndexUnavailable("down".to_string()))
        }
        async fn clear(&self) -> Result<usize, BotError> {
            Err(BotError::IndexUnavailable("down".to_string()))
        }
    }

    /// Replies with a canned string after failing the first `failures`
    /// calls. Counts every call.
    struct FlakyModel {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyModel {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatModel for FlakyModel {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(&self, _request: ChatRequest) -> Result<String, BotError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(BotError::GenerationUnavailable("flaky".to_string()))
            } else {
                Ok("generated reply".to_string())
            }
        }
    }

    fn orchestrator(
        index: Arc<dyn VectorStore>,
        model: Arc<FlakyModel>,
        store: Arc<dyn ConversationStore>,
    ) -> ResponseOrchestrator {
        ResponseOrchestrator::new(
            Retriever::new(Arc::new(UnitEmbedder), index),
            PromptComposer::new("Be helpful.", 10_000),
            model,
            store,
            ExchangeOptions {
                top_k: 3,
                min_score: 0.0,
                temperature: 0.7,
                max_tokens: 256,
                retry_max_attempts: 2,
                retry_base_delay: Duration::from_millis(1),
                fallback_reply: "fallback reply".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_any_call() {
        let model = Arc::new(FlakyModel::new(0));
        let orch = orchestrator(
            Arc::new(EmptyIndex),
            model.clone(),
            Arc::new(InMemoryConversationStore::new(10)),
        );

        let err = orch.handle_message("+1555", "   ").await.unwrap_err();
        assert!(matches!(err, BotError::EmptyMessage));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exchange_persists_user_then_assistant() {
        let store = Arc::new(InMemoryConversationStore::new(10));
        let orch = orchestrator(
            Arc::new(EmptyIndex),
            Arc::new(FlakyModel::new(0)),
            store.clone(),
        );

        let reply = orch.handle_message("+1555", "hello there").await.unwrap();
        assert_eq!(reply, "generated reply");

        let history = store.history("+1555").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, crate::history::Role::User);
        assert_eq!(history[0].text, "hello there");
        assert_eq!(history[1].role, crate::history::Role::Assistant);
        assert_eq!(history[1].text, "generated reply");
    }

    #[tokio::test]
    async fn unavailable_index_degrades_to_no_context() {
        let store = Arc::new(InMemoryConversationStore::new(10));
        let orch = orchestrator(
            Arc::new(DownIndex),
            Arc::new(FlakyModel::new(0)),
            store.clone(),
        );

        let reply = orch.handle_message("+1555", "hello").await.unwrap();
        assert_eq!(reply, "generated reply");
        assert_eq!(store.history("+1555").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let model = Arc::new(FlakyModel::new(1));
        let orch = orchestrator(
            Arc::new(EmptyIndex),
            model.clone(),
            Arc::new(InMemoryConversationStore::new(10)),
        );

        let reply = orch.handle_message("+1555", "hello").await.unwrap();
        assert_eq!(reply, "generated reply");
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_and_still_persist() {
        let store = Arc::new(InMemoryConversationStore::new(10));
        let model = Arc::new(FlakyModel::new(10));
        let orch = orchestrator(Arc::new(EmptyIndex), model.clone(), store.clone());

        let reply = orch.handle_message("+1555", "hello").await.unwrap();
        assert_eq!(reply, "fallback reply");
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);

        let history = store.history("+1555").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].text, "fallback reply");
    }
}
