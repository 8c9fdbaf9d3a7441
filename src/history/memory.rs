//! Process-local conversation backing. Fast, bounded, gone on restart.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::BotError;

use super::{ConversationStore, Turn};

pub struct InMemoryConversationStore {
    max_turns: usize,
    sessions: Mutex<HashMap<String, VecDeque<Turn>>>,
}

impl InMemoryConversationStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(&self, conversant_id: &str, turn: Turn) -> Result<(), BotError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(conversant_id.to_string()).or_default();
        session.push_back(turn);
        while session.len() > self.max_turns {
            session.pop_front();
        }
        Ok(())
    }

    async fn history(&self, conversant_id: &str) -> Result<Vec<Turn>, BotError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(conversant_id)
            .map(|session| session.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, conversant_id: &str) -> Result<(), BotError> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(conversant_id);
        Ok(())
    }
}
