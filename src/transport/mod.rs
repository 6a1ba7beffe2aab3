pub mod ws;

pub use ws::WsTransport;

#[cfg(test)]
use mockall::{automock, predicate::*};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    pub conversation_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_participant_id: Option<String>,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport closed")]
    Closed,
    #[error("websocket: {0}")]
    Socket(String),
}

/// Realtime channel bound to a single conversation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport {
    fn is_connected(&self) -> bool;
    fn connection_error(&self) -> Option<String>;
    /// Participant ids currently typing.
    fn typing_participants(&self) -> Vec<String>;
    async fn send_message(&self, payload: SendPayload) -> Result<(), TransportError>;
    async fn close(&self);
}

pub type ArcTransport = Arc<dyn Transport + Send + Sync>;

impl SendPayload {
    pub fn new(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            content: content.into(),
            assistant_participant_id: None,
        }
    }

    pub fn with_assistant(mut self, participant_id: impl Into<String>) -> Self {
        self.assistant_participant_id = Some(participant_id.into());
        self
    }
}

/// Placeholder used when the realtime endpoint could not be reached. Every
/// send goes to the REST fallback.
#[derive(Debug, Default)]
pub struct Disconnected {
    error: Option<String>,
}

impl Disconnected {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
        }
    }
}

#[async_trait]
impl Transport for Disconnected {
    fn is_connected(&self) -> bool {
        false
    }

    fn connection_error(&self) -> Option<String> {
        self.error.clone()
    }

    fn typing_participants(&self) -> Vec<String> {
        vec![]
    }

    async fn send_message(&self, _payload: SendPayload) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn close(&self) {}
}
