use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::chat::{ExchangeOptions, ResponseOrchestrator};
use crate::config::{AppConfig, AppPaths, ConversationBackend, ProviderKind};
use crate::errors::BotError;
use crate::history::{ConversationStore, InMemoryConversationStore, SqliteConversationStore};
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::openai::OpenAiProvider;
use crate::llm::{ChatModel, Embedder, HttpEmbedder};
use crate::prompt::PromptComposer;
use crate::rag::{IngestService, Retriever, SqliteVectorStore, VectorStore};

pub struct AppState {
    pub config: AppConfig,
    pub paths: AppPaths,
    pub index: Arc<dyn VectorStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub orchestrator: ResponseOrchestrator,
    pub ingest: IngestService,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn initialize(config: AppConfig, paths: AppPaths) -> Result<Arc<Self>, BotError> {
        let timeout = Duration::from_secs(config.llm.request_timeout_secs);

        let index: Arc<dyn VectorStore> =
            Arc::new(SqliteVectorStore::with_path(paths.index_db_path.clone()).await?);

        let conversations: Arc<dyn ConversationStore> = match config.conversation.backend {
            ConversationBackend::Memory => Arc::new(InMemoryConversationStore::new(
                config.conversation.max_history_turns,
            )),
            ConversationBackend::Sqlite => Arc::new(
                SqliteConversationStore::with_path(
                    paths.conversation_db_path.clone(),
                    config.conversation.max_history_turns,
                )
                .await?,
            ),
        };

        let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(
            config.llm.embedding_base_url.clone(),
            config.embedding_api_key(),
            config.llm.embedding_model.clone(),
            timeout,
        )?);

        let model: Arc<dyn ChatModel> = match config.llm.provider {
            ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
                config.llm.openai_base_url.clone(),
                config.api_key(),
                config.llm.model.clone(),
                timeout,
            )?),
            ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
                config.llm.anthropic_base_url.clone(),
                config.api_key(),
                config.llm.model.clone(),
                timeout,
            )?),
        };
        tracing::info!(provider = model.name(), model = %config.llm.model, "chat model configured");

        let retriever = Retriever::new(embedder.clone(), index.clone());
        let composer = PromptComposer::new(
            config.llm.system_prompt.clone(),
            config.llm.max_prompt_chars,
        );
        let options = ExchangeOptions {
            top_k: config.knowledge.top_k,
            min_score: config.knowledge.min_score,
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            retry_max_attempts: config.llm.retry_max_attempts,
            retry_base_delay: Duration::from_millis(config.llm.retry_base_delay_ms),
            fallback_reply: config.llm.fallback_reply.clone(),
        };
        let orchestrator =
            ResponseOrchestrator::new(retriever, composer, model, conversations.clone(), options);

        let ingest = IngestService::new(
            index.clone(),
            embedder,
            config.knowledge.chunk_size,
            config.knowledge.chunk_overlap,
        );

        Ok(Arc::new(AppState {
            config,
            paths,
            index,
            conversations,
            orchestrator,
            ingest,
            started_at: Utc::now(),
        }))
    }
}
