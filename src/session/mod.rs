#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

pub mod errors;

pub use errors::ErrorSlot;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::Result;
use tokio::sync::Mutex;

use crate::api::{ArcChatApi, RestClient};
use crate::cache::{ArcQueryCache, CacheKey, MessagePage, QueryCache};
use crate::config::{Configuration, SendPolicy, constants::ERROR_HISTORY, verbose};
use crate::models::{
    ArcEventTx, Conversation, ConversationSettings, ErrorSource, ParticipantDirectory,
    ProcessedParticipant, TransportEvent, UiError,
};
use crate::transport::{ArcTransport, Disconnected, SendPayload, WsTransport};

/// Keeps the local view of one conversation in sync with the backend.
///
/// Every public operation reports failure through its `bool` result and the
/// session error slot, never by returning an error.
pub struct Session {
    conversation_id: String,
    user_id: String,
    api: ArcChatApi,
    transport: ArcTransport,
    cache: ArcQueryCache,
    errors: ErrorSlot,
    policy: SendPolicy,
    send_lock: Mutex<()>,
    in_flight: AtomicBool,
}

/// Builds a session from configuration. A realtime connection failure is
/// not fatal: the session then sends everything over REST.
pub async fn new_session(
    config: &Configuration,
    conversation_id: &str,
    user_id: &str,
    event_tx: ArcEventTx,
) -> Result<Session> {
    let api: ArcChatApi = RestClient::from(&config.server).into();

    let ws_url = config.server.ws_url();
    verbose!("  [+] Connecting to {}", ws_url);
    let transport: ArcTransport = match WsTransport::connect(
        &ws_url,
        conversation_id,
        user_id,
        config.server.api_token.as_deref(),
        event_tx,
    )
    .await
    {
        Ok(transport) => {
            verbose!("  [+] Realtime connection established");
            Arc::new(transport)
        }
        Err(err) => {
            verbose!("  [-] Realtime connection unavailable, using REST only");
            log::warn!("Realtime connection failed: {:?}", err);
            Arc::new(Disconnected::new(err.to_string()))
        }
    };

    Ok(Session::new(
        conversation_id,
        user_id,
        api,
        transport,
        Arc::new(QueryCache::new()),
    )
    .with_policy(config.session.send_policy)
    .with_error_history(config.session.error_history))
}

impl Session {
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        api: ArcChatApi,
        transport: ArcTransport,
        cache: ArcQueryCache,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            api,
            transport,
            cache,
            errors: ErrorSlot::new(ERROR_HISTORY),
            policy: SendPolicy::default(),
            send_lock: Mutex::new(()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_policy(mut self, policy: SendPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_error_history(mut self, capacity: usize) -> Self {
        self.errors = ErrorSlot::new(capacity);
        self
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn cache(&self) -> &ArcQueryCache {
        &self.cache
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn connection_error(&self) -> Option<String> {
        self.transport.connection_error()
    }

    /// Fetches conversation details and messages into the cache.
    pub async fn load(&self) -> bool {
        let (conversation, messages) = tokio::join!(
            self.api.get_conversation(&self.conversation_id),
            self.api.list_messages(&self.conversation_id)
        );

        match (conversation, messages) {
            (Ok(conversation), Ok(messages)) => {
                self.cache.set_conversation(conversation);
                self.cache.set_messages(&self.conversation_id, messages);
                self.errors.clear();
                true
            }
            (Err(err), _) | (_, Err(err)) => {
                self.fail(ErrorSource::Load, "Failed to load conversation", &err);
                false
            }
        }
    }

    pub async fn send_message(&self, content: &str) -> bool {
        if content.trim().is_empty() {
            self.errors
                .set(ErrorSource::SendMessage, "Message cannot be empty");
            return false;
        }

        match self.policy {
            SendPolicy::Serialize => {
                let _guard = self.send_lock.lock().await;
                self.dispatch_send(content).await
            }
            SendPolicy::RejectIfBusy => {
                let Some(_guard) = InFlight::acquire(&self.in_flight) else {
                    log::debug!("Rejecting send, another send is in flight");
                    self.errors.set(
                        ErrorSource::SendMessage,
                        "Another message is still being sent",
                    );
                    return false;
                };
                self.dispatch_send(content).await
            }
            SendPolicy::Race => self.dispatch_send(content).await,
        }
    }

    async fn dispatch_send(&self, content: &str) -> bool {
        if self.transport.is_connected() {
            let mut payload = SendPayload::new(&self.conversation_id, content);
            if let Some(assistant) = self.assistant_participant_id() {
                payload = payload.with_assistant(assistant);
            }

            match self.transport.send_message(payload).await {
                Ok(()) => {
                    // The transport echo fills the cache.
                    self.errors.clear();
                    return true;
                }
                Err(err) => log::warn!("Realtime send failed, falling back to REST: {}", err),
            }
        }

        match self.api.send_message(&self.conversation_id, content).await {
            Ok(message) => {
                self.cache.append_message(&self.conversation_id, message);
                self.errors.clear();
                true
            }
            Err(err) => {
                self.fail(ErrorSource::SendMessage, "Failed to send message", &err);
                false
            }
        }
    }

    pub async fn delete_message(&self, message_id: &str) -> bool {
        match self
            .api
            .delete_message(&self.conversation_id, message_id)
            .await
        {
            Ok(()) => {
                self.cache
                    .remove_message(&self.conversation_id, message_id);
                self.errors.clear();
                true
            }
            Err(err) => {
                self.fail(ErrorSource::DeleteMessage, "Failed to delete message", &err);
                false
            }
        }
    }

    pub async fn generate_ai_response(&self, participant_id: &str) -> bool {
        match self
            .api
            .generate_ai_response(&self.conversation_id, participant_id)
            .await
        {
            Ok(message) => {
                self.cache.append_message(&self.conversation_id, message);
                self.errors.clear();
                true
            }
            Err(err) => {
                self.fail(
                    ErrorSource::GenerateResponse,
                    "Failed to generate response",
                    &err,
                );
                false
            }
        }
    }

    pub async fn add_participant(&self, acting_character_id: &str) -> bool {
        match self
            .api
            .add_participant(&self.conversation_id, acting_character_id)
            .await
        {
            Ok(()) => {
                self.errors.clear();
                self.refresh_conversation().await;
                true
            }
            Err(err) => {
                self.fail(ErrorSource::AddParticipant, "Failed to add participant", &err);
                false
            }
        }
    }

    pub async fn remove_participant(&self, participant_id: &str) -> bool {
        match self
            .api
            .remove_participant(&self.conversation_id, participant_id)
            .await
        {
            Ok(()) => {
                self.errors.clear();
                self.refresh_conversation().await;
                true
            }
            Err(err) => {
                self.fail(
                    ErrorSource::RemoveParticipant,
                    "Failed to remove participant",
                    &err,
                );
                false
            }
        }
    }

    pub async fn update_settings(&self, settings: ConversationSettings) -> bool {
        match self
            .api
            .update_conversation_settings(&self.conversation_id, settings)
            .await
        {
            Ok(conversation) => {
                self.cache.set_conversation(conversation);
                self.cache.invalidate(CacheKey::Conversations);
                self.errors.clear();
                true
            }
            Err(err) => {
                self.fail(ErrorSource::UpdateSettings, "Failed to update settings", &err);
                false
            }
        }
    }

    /// Applies a realtime event. Returns true when the message cache changed.
    pub fn handle_event(&self, event: &TransportEvent) -> bool {
        match event {
            TransportEvent::MessageReceived(message) => {
                if message.conversation_id() != self.conversation_id {
                    log::debug!(
                        "Ignoring message {} for conversation {}",
                        message.id(),
                        message.conversation_id()
                    );
                    return false;
                }
                self.cache
                    .append_message(&self.conversation_id, message.clone())
            }
            TransportEvent::ServerError(message) => {
                log::warn!("Realtime server error: {}", message);
                false
            }
            TransportEvent::Disconnected(reason) => {
                log::info!(
                    "Realtime transport disconnected: {}",
                    reason.as_deref().unwrap_or("no reason")
                );
                false
            }
            TransportEvent::Connected
            | TransportEvent::TypingStarted(_)
            | TransportEvent::TypingStopped(_) => false,
        }
    }

    pub fn conversation(&self) -> Option<Arc<Conversation>> {
        self.cache.conversation(&self.conversation_id)
    }

    pub fn messages(&self) -> Option<Arc<MessagePage>> {
        self.cache.messages(&self.conversation_id)
    }

    pub fn directory(&self) -> ParticipantDirectory {
        self.conversation()
            .map(|c| c.directory())
            .unwrap_or_default()
    }

    pub fn participants(&self) -> Vec<ProcessedParticipant> {
        self.directory().participants().to_vec()
    }

    /// Resolves a message sender by participant id or actor id.
    pub fn resolve_sender(&self, id: &str) -> Option<ProcessedParticipant> {
        self.directory().lookup(id).cloned()
    }

    /// Display names of the participants currently typing. Unknown ids are
    /// skipped.
    pub fn typing_names(&self) -> Vec<String> {
        let directory = self.directory();
        self.transport
            .typing_participants()
            .iter()
            .filter_map(|id| directory.display_name(id).map(str::to_string))
            .collect()
    }

    pub fn ui_error(&self) -> Option<UiError> {
        self.errors.current()
    }

    pub fn recent_errors(&self) -> Vec<UiError> {
        self.errors.recent()
    }

    pub fn clear_error(&self) {
        self.errors.clear();
    }

    /// Closes the realtime channel and drops every cached entry of the
    /// conversation.
    pub async fn dispose(&self) {
        self.transport.close().await;
        self.cache.dispose(&self.conversation_id);
    }

    async fn refresh_conversation(&self) {
        self.cache
            .invalidate(CacheKey::Conversation(self.conversation_id.clone()));
        self.cache.invalidate(CacheKey::Conversations);

        match self.api.get_conversation(&self.conversation_id).await {
            Ok(conversation) => self.cache.set_conversation(conversation),
            Err(err) => log::warn!(
                "Failed to refresh conversation {}: {:?}",
                self.conversation_id,
                err
            ),
        }
    }

    fn assistant_participant_id(&self) -> Option<String> {
        self.conversation()
            .and_then(|c| c.assistant().map(|p| p.id().to_string()))
    }

    fn fail(&self, source: ErrorSource, context: &str, err: &eyre::Report) {
        log::error!("{}: {:?}", context, err);
        self.errors.set(source, format!("{}: {}", context, err));
    }
}

/// Marks a send as in flight until dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
