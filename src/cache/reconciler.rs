#[cfg(test)]
#[path = "reconciler_test.rs"]
mod tests;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{Message, lenient::skip_invalid};

/// Cached page of a conversation's messages. `total` is the server side
/// count and may exceed `items.len()`. Malformed items are dropped when
/// decoding.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct MessagePage {
    #[serde(default, deserialize_with = "skip_invalid")]
    pub items: Vec<Message>,
    #[serde(default)]
    pub total: usize,
}

impl MessagePage {
    pub fn new(items: Vec<Message>) -> Self {
        let total = items.len();
        Self { items, total }
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.items.iter().any(|m| m.id() == message_id)
    }
}

/// Appends `message` to the page. A message whose id is already cached
/// returns the input `Arc` untouched, so callers can detect the no-op with
/// `Arc::ptr_eq`.
pub fn append_message(page: Option<&Arc<MessagePage>>, message: Message) -> Arc<MessagePage> {
    let page = match page {
        Some(page) => page,
        None => return Arc::new(MessagePage::new(vec![message])),
    };

    if page.contains(message.id()) {
        return Arc::clone(page);
    }

    let mut items = Vec::with_capacity(page.items.len() + 1);
    items.extend(page.items.iter().cloned());
    items.push(message);
    Arc::new(MessagePage {
        items,
        total: page.total + 1,
    })
}

/// Removes the message with `message_id`. Returns the input unchanged when
/// the id is not cached. `total` never goes below zero.
pub fn remove_message(
    page: Option<&Arc<MessagePage>>,
    message_id: &str,
) -> Option<Arc<MessagePage>> {
    let page = page?;
    if !page.contains(message_id) {
        return Some(Arc::clone(page));
    }

    let items = page
        .items
        .iter()
        .filter(|m| m.id() != message_id)
        .cloned()
        .collect::<Vec<_>>();
    Some(Arc::new(MessagePage {
        items,
        total: page.total.saturating_sub(1),
    }))
}
