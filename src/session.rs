use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Who the conversation partner is, as far as the record store is concerned.
/// Once `Verified`, a session never goes back to `Unverified`; a later
/// re-identification either overwrites the name pair or leaves it untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityState {
    Unverified,
    Verified {
        first_name: String,
        last_name: String,
    },
}

impl IdentityState {
    pub fn is_verified(&self) -> bool {
        matches!(self, IdentityState::Verified { .. })
    }
}

/// One tool invocation inside a turn: what the model asked for and what it
/// got back. `content` is the exact text the model read on the next loop
/// iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExchange {
    pub tool: String,
    pub arguments: Value,
    pub content: String,
    pub is_error: bool,
}

/// One user-message-to-reply exchange. Immutable once appended to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub user_text: String,
    pub exchanges: Vec<ToolExchange>,
    pub reply: String,
    pub created_at: DateTime<Utc>,
}

/// Flattened view of a turn for the message-history endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn records(&self) -> Vec<MessageRecord> {
        let mut out = Vec::with_capacity(2 + self.exchanges.len());
        out.push(MessageRecord {
            role: "user".into(),
            content: self.user_text.clone(),
            timestamp: self.created_at,
        });
        for ex in &self.exchanges {
            out.push(MessageRecord {
                role: "tool".into(),
                content: format!("{}: {}", ex.tool, ex.content),
                timestamp: self.created_at,
            });
        }
        out.push(MessageRecord {
            role: "assistant".into(),
            content: self.reply.clone(),
            timestamp: self.created_at,
        });
        out
    }
}

const TITLE_MAX: usize = 50;

/// Derive a thread title from its first message.
pub fn generate_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    if trimmed.is_empty() {
        return "New Conversation".into();
    }
    let total = trimmed.chars().count();
    let mut title = String::new();
    for (i, c) in trimmed.chars().enumerate() {
        if total > TITLE_MAX && i >= TITLE_MAX - 3 {
            title.push_str("...");
            break;
        }
        if i == 0 {
            title.extend(c.to_uppercase());
        } else {
            title.push(c);
        }
    }
    title
}
