use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::BotError;

/// Filesystem locations for runtime data. Overridable through
/// `CONCIERGE_DATA_DIR` / `CONCIERGE_CONFIG` for packaged deployments.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub index_db_path: PathBuf,
    pub conversation_db_path: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = env::var("CONCIERGE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let log_dir = data_dir.join("logs");
        let index_db_path = data_dir.join("knowledge.db");
        let conversation_db_path = data_dir.join("conversations.db");
        let config_path = env::var("CONCIERGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./concierge.toml"));

        for dir in [&data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            index_db_path,
            conversation_db_path,
            config_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub knowledge: KnowledgeConfig,
    pub conversation: ConversationConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Chunking and retrieval parameters. All four are operator-supplied;
/// there are no baked-in defaults for them.
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub min_score: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationConfig {
    /// Maximum retained turns per conversant. Oldest turns are evicted first.
    pub max_history_turns: usize,
    #[serde(default)]
    pub backend: ConversationBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    pub embedding_model: String,
    #[serde(default = "default_openai_base_url")]
    pub embedding_base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f64 {
    0.7
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_system_prompt() -> String {
    "You are a helpful assistant for a business. Answer customer questions \
     accurately and professionally based on the provided knowledge base. \
     Be friendly and concise. If the answer is not in the knowledge base, \
     say so politely."
        .to_string()
}

fn default_fallback_reply() -> String {
    "Sorry, I'm having trouble processing your message right now. \
     Please try again later."
        .to_string()
}

fn default_max_prompt_chars() -> usize {
    24_000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, BotError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            BotError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = toml::from_str(&raw)
            .map_err(|e| BotError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BotError> {
        let k = &self.knowledge;
        if k.chunk_size == 0 {
            return Err(BotError::InvalidConfig(
                "knowledge.chunk_size must be greater than zero".to_string(),
            ));
        }
        if k.chunk_overlap >= k.chunk_size {
            return Err(BotError::InvalidConfig(format!(
                "knowledge.chunk_overlap ({}) must be smaller than chunk_size ({})",
                k.chunk_overlap, k.chunk_size
            )));
        }
        if k.top_k == 0 {
            return Err(BotError::InvalidConfig(
                "knowledge.top_k must be greater than zero".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&k.min_score) {
            return Err(BotError::InvalidConfig(format!(
                "knowledge.min_score ({}) must lie in [-1, 1]",
                k.min_score
            )));
        }
        if self.conversation.max_history_turns == 0 {
            return Err(BotError::InvalidConfig(
                "conversation.max_history_turns must be greater than zero".to_string(),
            ));
        }
        if self.llm.max_prompt_chars <= self.llm.system_prompt.chars().count() {
            return Err(BotError::InvalidConfig(
                "llm.max_prompt_chars must exceed the system prompt length".to_string(),
            ));
        }
        if self.llm.retry_max_attempts == 0 {
            return Err(BotError::InvalidConfig(
                "llm.retry_max_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Provider API key, read from the environment rather than the config
    /// file so secrets stay out of the TOML.
    pub fn api_key(&self) -> Option<String> {
        let var = match self.llm.provider {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        };
        env::var(var).ok().filter(|v| !v.is_empty())
    }

    /// Embeddings always go through an OpenAI-compatible endpoint.
    pub fn embedding_api_key(&self) -> Option<String> {
        env::var("OPENAI_API_KEY").ok().filter(|v| !v.is_empty())
    }
}
