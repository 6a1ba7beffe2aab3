use super::*;
use std::time;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;

fn message_json(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "conversationId": "c1",
        "senderId": "p2",
        "senderType": "CHARACTER",
        "content": "Welcome back.",
        "timestamp": "2024-05-01T10:00:00Z",
    })
}

#[test]
fn test_apply_frame_typing() {
    let state = RwLock::new(ConnectionState::default());

    let event = apply_frame(&state, r#"{"type": "typing_start", "participantId": "p2"}"#);
    assert_eq!(event, Some(TransportEvent::TypingStarted("p2".to_string())));
    // Repeated start is not forwarded twice.
    let event = apply_frame(&state, r#"{"type": "typing_start", "participantId": "p2"}"#);
    assert_eq!(event, None);
    assert_eq!(state.read().unwrap().typing.len(), 1);

    let event = apply_frame(&state, r#"{"type": "typing_stop", "participantId": "p2"}"#);
    assert_eq!(event, Some(TransportEvent::TypingStopped("p2".to_string())));
    assert!(state.read().unwrap().typing.is_empty());
}

#[test]
fn test_apply_frame_message_and_errors() {
    let state = RwLock::new(ConnectionState::default());

    let frame = serde_json::json!({"type": "message", "message": message_json("m1")});
    match apply_frame(&state, &frame.to_string()) {
        Some(TransportEvent::MessageReceived(msg)) => assert_eq!(msg.id(), "m1"),
        other => panic!("unexpected event: {:?}", other),
    }

    let event = apply_frame(&state, r#"{"type": "error", "message": "rate limited"}"#);
    assert_eq!(
        event,
        Some(TransportEvent::ServerError("rate limited".to_string()))
    );
    assert_eq!(
        state.read().unwrap().error.as_deref(),
        Some("rate limited")
    );

    assert_eq!(apply_frame(&state, r#"{"type": "presence", "users": []}"#), None);
    assert_eq!(apply_frame(&state, "not json"), None);
}

#[test]
fn test_client_frame_encoding() {
    let frame = ClientFrame::SendMessage {
        conversation_id: "c1".to_string(),
        content: "Hi".to_string(),
        assistant_participant_id: None,
    };
    assert_eq!(
        serde_json::to_value(&frame).unwrap(),
        serde_json::json!({"type": "send_message", "conversationId": "c1", "content": "Hi"})
    );

    let frame = ClientFrame::SendMessage {
        conversation_id: "c1".to_string(),
        content: "Hi".to_string(),
        assistant_participant_id: Some("p9".to_string()),
    };
    assert_eq!(
        serde_json::to_value(&frame).unwrap()["assistantParticipantId"],
        "p9"
    );
}

async fn next_event(rx: &mut UnboundedReceiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(time::Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_connect_send_and_receive() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(socket)
            .await
            .expect("handshake");

        let mut frames = vec![];
        for _ in 0..2 {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    frames.push(serde_json::from_str::<serde_json::Value>(&text).unwrap())
                }
                other => panic!("unexpected frame: {:?}", other),
            }
        }

        let echo = serde_json::json!({"type": "message", "message": message_json("m7")});
        ws.send(WsMessage::Text(echo.to_string()))
            .await
            .expect("send echo");
        ws.close(None).await.expect("close");
        frames
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<TransportEvent>();
    let transport = WsTransport::connect(
        &format!("ws://{}", addr),
        "c1",
        "u1",
        Some("test_token"),
        Arc::new(tx),
    )
    .await
    .expect("failed to connect");

    assert!(transport.is_connected());
    assert_eq!(transport.conversation_id(), "c1");
    assert_eq!(next_event(&mut rx).await, TransportEvent::Connected);

    transport
        .send_message(SendPayload::new("c1", "Hello").with_assistant("p9"))
        .await
        .expect("failed to send");

    match next_event(&mut rx).await {
        TransportEvent::MessageReceived(msg) => assert_eq!(msg.id(), "m7"),
        other => panic!("unexpected event: {:?}", other),
    }
    match next_event(&mut rx).await {
        TransportEvent::Disconnected(_) => {}
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(!transport.is_connected());
    assert!(matches!(
        transport.send_message(SendPayload::new("c1", "late")).await,
        Err(TransportError::NotConnected)
    ));

    let frames = server.await.expect("server task");
    assert_eq!(frames[0]["type"], "join");
    assert_eq!(frames[0]["conversationId"], "c1");
    assert_eq!(frames[0]["userId"], "u1");
    assert_eq!(frames[1]["type"], "send_message");
    assert_eq!(frames[1]["content"], "Hello");
    assert_eq!(frames[1]["assistantParticipantId"], "p9");
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let (tx, _rx) = mpsc::unbounded_channel::<TransportEvent>();
    let result = WsTransport::connect(&format!("ws://{}", addr), "c1", "u1", None, Arc::new(tx)).await;
    assert!(result.is_err());
}
