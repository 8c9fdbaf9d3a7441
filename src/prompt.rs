//! Prompt composition: system instructions, retrieved context, trimmed
//! history, and the current user message folded into one model request.

use crate::history::{Role, Turn};
use crate::llm::{ChatMessage, ChatRequest};
use crate::rag::ScoredChunk;

const CONTEXT_HEADER: &str = "Knowledge base context:";

pub struct PromptComposer {
    system_instructions: String,
    max_prompt_chars: usize,
}

impl PromptComposer {
    pub fn new(system_instructions: impl Into<String>, max_prompt_chars: usize) -> Self {
        Self {
            system_instructions: system_instructions.into(),
            max_prompt_chars,
        }
    }

    /// Build the request. When the composed size exceeds the budget,
    /// history is dropped oldest-first, then context lowest-ranked-first.
    /// The system instructions and the user message are never altered.
    pub fn compose(
        &self,
        retrieval: &[ScoredChunk],
        history: &[Turn],
        user_message: &str,
    ) -> ChatRequest {
        let mut context_len = retrieval.len();
        let mut history_start = 0;

        loop {
            let system = self.render_system(&retrieval[..context_len]);
            let kept_history = &history[history_start..];

            let total = system.chars().count()
                + kept_history
                    .iter()
                    .map(|t| t.text.chars().count())
                    .sum::<usize>()
                + user_message.chars().count();

            if total <= self.max_prompt_chars {
                return self.build(system, kept_history, user_message);
            }
            if history_start < history.len() {
                history_start += 1;
            } else if context_len > 0 {
                context_len -= 1;
            } else {
                // Nothing left to trim.
                return self.build(system, kept_history, user_message);
            }
        }
    }

    /// System instructions plus the labeled context block. An empty
    /// retrieval omits the block entirely; the model is never told
    /// "no relevant information" on our behalf.
    fn render_system(&self, retrieval: &[ScoredChunk]) -> String {
        if retrieval.is_empty() {
            return self.system_instructions.clone();
        }

        let mut system = String::with_capacity(self.system_instructions.len() + 256);
        system.push_str(&self.system_instructions);
        system.push_str("\n\n");
        system.push_str(CONTEXT_HEADER);
        system.push('\n');
        for (i, hit) in retrieval.iter().enumerate() {
            system.push_str(&format!(
                "\n[{}] (source: {}, relevance: {:.2})\n{}\n",
                i + 1,
                hit.chunk.source_ref,
                hit.score,
                hit.chunk.text
            ));
        }
        system
    }

    fn build(&self, system: String, history: &[Turn], user_message: &str) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        for turn in history {
            messages.push(match turn.role {
                Role::User => ChatMessage::user(turn.text.clone()),
                Role::Assistant => ChatMessage::assistant(turn.text.clone()),
            });
        }
        messages.push(ChatMessage::user(user_message));
        ChatRequest::new(messages)
    }
}
