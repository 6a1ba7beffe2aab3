#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;

pub mod reconciler;

pub use reconciler::{MessagePage, append_message, remove_message};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{Conversation, Message};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Conversations,
    Conversation(String), // Conversation ID
    Messages(String),     // Conversation ID
}

#[derive(Default)]
struct State {
    conversations: HashMap<String, Arc<Conversation>>,
    messages: HashMap<String, Arc<MessagePage>>,
    stale: HashSet<CacheKey>,
}

/// Client side copy of conversations and their messages. Message pages are
/// only changed through the reconciler operations and every write swaps
/// the whole per-conversation entry.
#[derive(Default)]
pub struct QueryCache {
    state: RwLock<State>,
}

pub type ArcQueryCache = Arc<QueryCache>;

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self, conversation_id: &str) -> Option<Arc<MessagePage>> {
        self.read().messages.get(conversation_id).cloned()
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<Arc<Conversation>> {
        self.read().conversations.get(conversation_id).cloned()
    }

    pub fn set_messages(&self, conversation_id: &str, page: MessagePage) {
        let mut state = self.write();
        state
            .messages
            .insert(conversation_id.to_string(), Arc::new(page));
        state
            .stale
            .remove(&CacheKey::Messages(conversation_id.to_string()));
    }

    pub fn set_conversation(&self, conversation: Conversation) {
        let mut state = self.write();
        let id = conversation.id().to_string();
        state.stale.remove(&CacheKey::Conversation(id.clone()));
        state.conversations.insert(id, Arc::new(conversation));
    }

    /// Returns true when the cache changed.
    pub fn append_message(&self, conversation_id: &str, message: Message) -> bool {
        let mut state = self.write();
        let prev = state.messages.get(conversation_id);
        let next = append_message(prev, message);
        if prev.is_some_and(|prev| Arc::ptr_eq(prev, &next)) {
            log::debug!(
                "Message already cached for conversation {}, skipping",
                conversation_id
            );
            return false;
        }
        state.messages.insert(conversation_id.to_string(), next);
        mark_dependents_stale(&mut state, conversation_id);
        true
    }

    /// Returns true when the cache changed.
    pub fn remove_message(&self, conversation_id: &str, message_id: &str) -> bool {
        let mut state = self.write();
        let prev = state.messages.get(conversation_id);
        let next = match remove_message(prev, message_id) {
            Some(next) => next,
            None => return false,
        };
        if prev.is_some_and(|prev| Arc::ptr_eq(prev, &next)) {
            return false;
        }
        state.messages.insert(conversation_id.to_string(), next);
        mark_dependents_stale(&mut state, conversation_id);
        true
    }

    pub fn invalidate(&self, key: CacheKey) {
        self.write().stale.insert(key);
    }

    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.read().stale.contains(key)
    }

    /// Drops every entry that belongs to the conversation.
    pub fn dispose(&self, conversation_id: &str) {
        let mut state = self.write();
        state.messages.remove(conversation_id);
        state.conversations.remove(conversation_id);
        state.stale.retain(|key| match key {
            CacheKey::Conversation(id) | CacheKey::Messages(id) => id != conversation_id,
            CacheKey::Conversations => true,
        });
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn mark_dependents_stale(state: &mut State, conversation_id: &str) {
    state.stale.insert(CacheKey::Conversations);
    state
        .stale
        .insert(CacheKey::Conversation(conversation_id.to_string()));
}
