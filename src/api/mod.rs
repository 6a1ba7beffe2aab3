pub mod rest;

pub use rest::{ApiError, RestClient};

#[cfg(test)]
use mockall::{automock, predicate::*};

use crate::{
    cache::MessagePage,
    models::{Conversation, ConversationSettings, Message},
};
use async_trait::async_trait;
use eyre::Result;
use std::sync::Arc;

/// HTTP surface of the chat backend.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatApi {
    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation>;
    async fn list_messages(&self, conversation_id: &str) -> Result<MessagePage>;
    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message>;
    async fn delete_message(&self, conversation_id: &str, message_id: &str) -> Result<()>;
    async fn generate_ai_response(
        &self,
        conversation_id: &str,
        participant_id: &str,
    ) -> Result<Message>;
    async fn add_participant(&self, conversation_id: &str, acting_character_id: &str)
    -> Result<()>;
    async fn remove_participant(&self, conversation_id: &str, participant_id: &str) -> Result<()>;
    async fn update_conversation_settings(
        &self,
        conversation_id: &str,
        settings: ConversationSettings,
    ) -> Result<Conversation>;
}

pub type ArcChatApi = Arc<dyn ChatApi + Send + Sync>;
