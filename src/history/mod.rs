//! Per-conversant bounded conversation memory.
//!
//! Two interchangeable backings implement the same contract: a
//! process-local map (no durability, single process) and SQLite (durable,
//! shared across processes). Which one is active is a configuration
//! concern; nothing else in the crate knows the difference.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::BotError;

pub use memory::InMemoryConversationStore;
pub use sqlite::SqliteConversationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Turn {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a turn, then evict the oldest turns beyond the configured
    /// maximum. Sessions are created lazily on first append.
    async fn append(&self, conversant_id: &str, turn: Turn) -> Result<(), BotError>;

    /// Current history in chronological order; unknown conversants read
    /// as an empty session.
    async fn history(&self, conversant_id: &str) -> Result<Vec<Turn>, BotError>;

    /// Drop the session entirely.
    async fn clear(&self, conversant_id: &str) -> Result<(), BotError>;
}
