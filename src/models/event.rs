use std::sync::Arc;

use tokio::sync::mpsc;

use super::Message;

/// Events produced by the realtime transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected(Option<String>),

    MessageReceived(Message),
    TypingStarted(String), // Participant ID
    TypingStopped(String), // Participant ID

    ServerError(String),
}

#[async_trait::async_trait]
pub trait EventTx {
    async fn send(
        &self,
        event: TransportEvent,
    ) -> Result<(), mpsc::error::SendError<TransportEvent>>;
}

#[async_trait::async_trait]
impl EventTx for mpsc::Sender<TransportEvent> {
    async fn send(
        &self,
        event: TransportEvent,
    ) -> Result<(), mpsc::error::SendError<TransportEvent>> {
        self.send(event).await
    }
}

#[async_trait::async_trait]
impl EventTx for mpsc::UnboundedSender<TransportEvent> {
    async fn send(
        &self,
        event: TransportEvent,
    ) -> Result<(), mpsc::error::SendError<TransportEvent>> {
        self.send(event)
    }
}

pub type ArcEventTx = Arc<dyn EventTx + Send + Sync>;
