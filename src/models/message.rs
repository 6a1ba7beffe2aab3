#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderType {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "CHARACTER")]
    Character,
    #[serde(rename = "ASSISTANT")]
    Assistant,
    #[serde(rename = "SYSTEM")]
    System,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: String,
    conversation_id: String,
    sender_id: String,
    sender_type: SenderType,
    content: String,
    #[serde(alias = "createdAt")]
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// Content of a message once classified. Control payloads are JSON objects
/// carrying a `type` field, e.g. an action confirmation request.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent<'a> {
    Text(&'a str),
    Control { kind: String, payload: Value },
}

impl Message {
    pub fn new(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        sender_type: SenderType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            sender_type,
            content: content.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn sender_type(&self) -> SenderType {
        self.sender_type
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        self.timestamp
    }

    pub fn is_system(&self) -> bool {
        self.sender_type == SenderType::System
    }

    pub fn classify(&self) -> MessageContent<'_> {
        let trimmed = self.content.trim();
        if !trimmed.starts_with('{') {
            return MessageContent::Text(&self.content);
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(payload) => match payload.get("type").and_then(Value::as_str) {
                Some(kind) => MessageContent::Control {
                    kind: kind.to_string(),
                    payload,
                },
                None => MessageContent::Text(&self.content),
            },
            Err(_) => MessageContent::Text(&self.content),
        }
    }
}

impl Display for SenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SenderType::User => write!(f, "user"),
            SenderType::Character => write!(f, "character"),
            SenderType::Assistant => write!(f, "assistant"),
            SenderType::System => write!(f, "system"),
        }
    }
}
