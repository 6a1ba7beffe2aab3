#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use eyre::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;

use super::{SendPayload, Transport, TransportError};
use crate::config::user_agent;
use crate::models::{ArcEventTx, Message, TransportEvent};

#[derive(Serialize, Debug)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
enum ClientFrame {
    Join {
        conversation_id: String,
        user_id: String,
        client_id: String,
    },
    SendMessage {
        conversation_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        assistant_participant_id: Option<String>,
    },
}

#[derive(Deserialize, Debug)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
enum ServerFrame {
    Message {
        message: Message,
    },
    TypingStart {
        participant_id: String,
    },
    TypingStop {
        participant_id: String,
    },
    Error {
        message: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Default)]
struct ConnectionState {
    connected: bool,
    error: Option<String>,
    typing: BTreeSet<String>,
}

type Outbound = (ClientFrame, oneshot::Sender<Result<(), String>>);

/// WebSocket transport for one conversation. Incoming frames are turned
/// into [`TransportEvent`]s and pushed to the event sender.
pub struct WsTransport {
    conversation_id: String,
    state: Arc<RwLock<ConnectionState>>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    token: CancellationToken,
}

impl WsTransport {
    pub async fn connect(
        url: &str,
        conversation_id: &str,
        user_id: &str,
        api_token: Option<&str>,
        event_tx: ArcEventTx,
    ) -> Result<Self> {
        let mut request = url
            .into_client_request()
            .wrap_err(format!("building websocket request {}", url))?;
        let headers = request.headers_mut();
        headers.insert(
            "User-Agent",
            HeaderValue::from_str(&user_agent()).wrap_err("encoding user agent")?,
        );
        if let Some(token) = api_token {
            headers.insert(
                "Authorization",
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .wrap_err("encoding authorization header")?,
            );
        }

        log::info!("Connecting to {} for conversation {}", url, conversation_id);
        let (stream, response) = connect_async(request)
            .await
            .wrap_err(format!("connecting to {}", url))?;
        log::debug!("Websocket handshake status: {}", response.status());

        let (mut write, mut read) = stream.split();

        let join = ClientFrame::Join {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
        };
        let join = serde_json::to_string(&join).wrap_err("encoding join frame")?;
        write
            .send(WsMessage::Text(join))
            .await
            .wrap_err("sending join frame")?;

        let state = Arc::new(RwLock::new(ConnectionState {
            connected: true,
            ..Default::default()
        }));
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let token = CancellationToken::new();

        let worker_state = Arc::clone(&state);
        let worker_token = token.clone();
        let worker_conversation = conversation_id.to_string();
        tokio::spawn(async move {
            let _ = event_tx.send(TransportEvent::Connected).await;
            let reason = loop {
                tokio::select! {
                    _ = worker_token.cancelled() => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break None;
                    }

                    outbound = outbound_rx.recv() => {
                        let Some((frame, ack)) = outbound else {
                            break None;
                        };
                        let result = match serde_json::to_string(&frame) {
                            Ok(text) => write.send(WsMessage::Text(text)).await.map_err(|e| e.to_string()),
                            Err(err) => Err(err.to_string()),
                        };
                        let failed = result.as_ref().err().cloned();
                        let _ = ack.send(result);
                        if let Some(err) = failed {
                            break Some(err);
                        }
                    }

                    incoming = read.next() => {
                        match incoming {
                            Some(Ok(WsMessage::Text(text))) => {
                                log::trace!("websocket frame: {}", text);
                                if let Some(event) = apply_frame(&worker_state, &text) {
                                    if event_tx.send(event).await.is_err() {
                                        log::debug!("Event receiver dropped, closing websocket");
                                        break None;
                                    }
                                }
                            }
                            Some(Ok(WsMessage::Close(frame))) => {
                                break Some(frame.map(|f| f.reason.to_string()).unwrap_or_else(|| "closed by server".to_string()));
                            }
                            Some(Ok(_)) => {}
                            Some(Err(err)) => break Some(err.to_string()),
                            None => break Some("connection closed".to_string()),
                        }
                    }
                }
            };

            {
                let mut state = worker_state.write().unwrap_or_else(PoisonError::into_inner);
                state.connected = false;
                state.typing.clear();
                if reason.is_some() {
                    state.error = reason.clone();
                }
            }
            match reason.as_deref() {
                Some(reason) => log::warn!(
                    "Websocket for conversation {} disconnected: {}",
                    worker_conversation,
                    reason
                ),
                None => log::debug!("Websocket for conversation {} closed", worker_conversation),
            }
            let _ = event_tx.send(TransportEvent::Disconnected(reason)).await;
        });

        Ok(Self {
            conversation_id: conversation_id.to_string(),
            state,
            outbound_tx,
            token,
        })
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn is_connected(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .connected
    }

    fn connection_error(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .error
            .clone()
    }

    fn typing_participants(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .typing
            .iter()
            .cloned()
            .collect()
    }

    async fn send_message(&self, payload: SendPayload) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let frame = ClientFrame::SendMessage {
            conversation_id: payload.conversation_id,
            content: payload.content,
            assistant_participant_id: payload.assistant_participant_id,
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        self.outbound_tx
            .send((frame, ack_tx))
            .map_err(|_| TransportError::Closed)?;

        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(TransportError::Socket(err)),
            Err(_) => Err(TransportError::Closed),
        }
    }

    async fn close(&self) {
        self.token.cancel();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Applies an incoming text frame to the connection state and returns the
/// event to forward, if any.
fn apply_frame(state: &RwLock<ConnectionState>, text: &str) -> Option<TransportEvent> {
    let frame = match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => frame,
        Err(err) => {
            log::warn!("Ignoring malformed websocket frame: {} - {}", err, text);
            return None;
        }
    };

    match frame {
        ServerFrame::Message { message } => Some(TransportEvent::MessageReceived(message)),
        ServerFrame::TypingStart { participant_id } => {
            let inserted = state
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .typing
                .insert(participant_id.clone());
            inserted.then_some(TransportEvent::TypingStarted(participant_id))
        }
        ServerFrame::TypingStop { participant_id } => {
            let removed = state
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .typing
                .remove(&participant_id);
            removed.then_some(TransportEvent::TypingStopped(participant_id))
        }
        ServerFrame::Error { message } => {
            log::warn!("Websocket server error: {}", message);
            state.write().unwrap_or_else(PoisonError::into_inner).error = Some(message.clone());
            Some(TransportEvent::ServerError(message))
        }
        ServerFrame::Unknown => None,
    }
}
