pub mod conversation;
pub mod error;
pub mod event;
pub mod lenient;
pub mod message;
pub mod participant;

pub use conversation::{Conversation, ConversationSettings};
pub use error::{ErrorSource, UiError};
pub use event::{ArcEventTx, EventTx, TransportEvent};
pub use message::{Message, MessageContent, SenderType};
pub use participant::*;
