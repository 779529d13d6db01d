//! Transcript compaction for keeping backend prompts bounded.

use crate::types::{Message, Role};
use tracing::{debug, info};

pub const DEFAULT_MAX_MESSAGES: usize = 40;
pub const DEFAULT_MAX_TOKENS: usize = 16_000;

/// Drops the oldest messages of a session transcript once it exceeds a
/// message count or an estimated token budget.
#[derive(Debug, Clone, Copy)]
pub struct Compactor {
    max_messages: usize,
    max_tokens: usize,
}

impl Default for Compactor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES, DEFAULT_MAX_TOKENS)
    }
}

impl Compactor {
    /// Limits below one message are raised to one.
    pub fn new(max_messages: usize, max_tokens: usize) -> Self {
        Self {
            max_messages: max_messages.max(1),
            max_tokens,
        }
    }

    /// Compact `messages` in place. Returns the number of messages dropped.
    ///
    /// The newest message is always kept, and the retained transcript never
    /// starts with an assistant turn.
    pub fn compact(&self, messages: &mut Vec<Message>) -> usize {
        let before = messages.len();
        let mut tokens = estimate_tokens(messages);

        if before <= self.max_messages && tokens <= self.max_tokens {
            debug!(
                "History of {} messages (~{} tokens) within limits",
                before, tokens
            );
            return 0;
        }

        let mut drop = 0;
        while drop + 1 < before
            && (before - drop > self.max_messages || tokens > self.max_tokens)
        {
            tokens -= message_tokens(&messages[drop]);
            drop += 1;
        }
        while drop + 1 < before && messages[drop].role == Role::Assistant {
            drop += 1;
        }

        messages.drain(..drop);
        info!(
            "Compacted history from {} to {} messages",
            before,
            messages.len()
        );
        drop
    }
}

/// Rough token estimate, four characters per token.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(message_tokens).sum()
}

fn message_tokens(message: &Message) -> usize {
    message.content.chars().count() / 4 + 1
}
