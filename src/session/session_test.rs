use super::*;
use crate::api::{ChatApi, MockChatApi};
use crate::models::{
    AssistantRef, Message, Participant, ParticipantRecord, SenderType, UserRef,
};
use crate::transport::{MockTransport, TransportError};
use async_trait::async_trait;
use std::sync::atomic::AtomicUsize;
use std::time;
use tokio::sync::Notify;

fn msg(id: &str, content: &str) -> Message {
    Message::new("c1", "p1", SenderType::User, content).with_id(id)
}

fn disconnected_transport() -> MockTransport {
    let mut transport = MockTransport::new();
    transport.expect_is_connected().return_const(false);
    transport.expect_send_message().times(0);
    transport
}

fn setup_session(api: impl ChatApi + Send + Sync + 'static, transport: MockTransport) -> Session {
    Session::new(
        "c1",
        "u1",
        Arc::new(api),
        Arc::new(transport),
        Arc::new(QueryCache::new()),
    )
}

fn conversation() -> Conversation {
    let user = Participant::from_record(ParticipantRecord {
        id: "p1".to_string(),
        user_id: Some("u1".to_string()),
        user: Some(UserRef {
            id: "u1".to_string(),
            display_name: Some("Kim".to_string()),
            avatar_url: None,
        }),
        ..Default::default()
    })
    .unwrap();
    let assistant = Participant::from_record(ParticipantRecord {
        id: "p9".to_string(),
        acting_assistant_id: Some("a1".to_string()),
        acting_assistant: Some(AssistantRef {
            id: "a1".to_string(),
            name: "Narrator".to_string(),
            avatar_url: None,
        }),
        ..Default::default()
    })
    .unwrap();
    Conversation::new("c1").with_participants(vec![user, assistant])
}

#[tokio::test]
async fn test_transport_failure_falls_back_to_rest() {
    let mut transport = MockTransport::new();
    transport.expect_is_connected().return_const(true);
    transport
        .expect_send_message()
        .times(1)
        .returning(|_| Err(TransportError::Socket("broken pipe".to_string())));

    let mut api = MockChatApi::new();
    api.expect_send_message()
        .times(1)
        .withf(|id, content| id == "c1" && content == "Hello")
        .returning(|_, _| Ok(msg("m1", "Hello")));

    let session = setup_session(api, transport);
    assert!(session.send_message("Hello").await);

    let page = session.messages().expect("messages cached");
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id(), "m1");
    assert!(session.ui_error().is_none());

    // A late echo of the same message does not duplicate it.
    assert!(!session.handle_event(&TransportEvent::MessageReceived(msg("m1", "Hello"))));
    let page = session.messages().expect("messages cached");
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn test_disconnected_transport_uses_rest_directly() {
    let mut api = MockChatApi::new();
    api.expect_send_message()
        .times(1)
        .returning(|_, content| Ok(msg("m1", content)));

    let session = setup_session(api, disconnected_transport());
    assert!(session.send_message("Hi").await);
    assert_eq!(session.messages().map(|p| p.total), Some(1));
}

#[tokio::test]
async fn test_transport_success_skips_rest() {
    let mut transport = MockTransport::new();
    transport.expect_is_connected().return_const(true);
    transport
        .expect_send_message()
        .times(1)
        .withf(|payload| {
            payload.conversation_id == "c1"
                && payload.content == "Hi"
                && payload.assistant_participant_id.as_deref() == Some("p9")
        })
        .returning(|_| Ok(()));

    let mut api = MockChatApi::new();
    api.expect_send_message().times(0);

    let session = setup_session(api, transport);
    session.cache().set_conversation(conversation());
    assert!(session.send_message("Hi").await);
    // The cache waits for the transport echo.
    assert!(session.messages().is_none());

    assert!(session.handle_event(&TransportEvent::MessageReceived(msg("m5", "Hi"))));
    assert_eq!(session.messages().map(|p| p.total), Some(1));
}

#[tokio::test]
async fn test_rest_failure_sets_error() {
    let mut api = MockChatApi::new();
    api.expect_send_message()
        .times(1)
        .returning(|_, _| Err(eyre::eyre!("connection refused")));

    let session = setup_session(api, disconnected_transport());
    assert!(!session.send_message("Hello").await);

    let err = session.ui_error().expect("error is set");
    assert_eq!(err.source(), ErrorSource::SendMessage);
    assert!(!err.message().is_empty());
    assert!(err.message().contains("connection refused"));
    assert!(session.messages().is_none());
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let mut api = MockChatApi::new();
    api.expect_send_message().times(0);

    let session = setup_session(api, disconnected_transport());
    assert!(!session.send_message("   ").await);
    assert_eq!(
        session.ui_error().map(|e| e.source()),
        Some(ErrorSource::SendMessage)
    );
}

#[tokio::test]
async fn test_delete_message() {
    let mut api = MockChatApi::new();
    api.expect_delete_message().times(2).returning(|_, _| Ok(()));

    let session = setup_session(api, disconnected_transport());
    session
        .cache()
        .set_messages("c1", MessagePage::new(vec![msg("m1", "a"), msg("m2", "b")]));

    // Unknown id leaves the page untouched.
    let before = session.messages().expect("page");
    assert!(session.delete_message("m404").await);
    let after = session.messages().expect("page");
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.total, 2);
    assert_eq!(after.items.len(), 2);

    assert!(session.delete_message("m1").await);
    let page = session.messages().expect("page");
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id(), "m2");
    assert!(session.cache().is_stale(&CacheKey::Conversations));
}

#[tokio::test]
async fn test_delete_failure_keeps_cache() {
    let mut api = MockChatApi::new();
    api.expect_delete_message()
        .times(1)
        .returning(|_, _| Err(eyre::eyre!("forbidden")));

    let session = setup_session(api, disconnected_transport());
    session
        .cache()
        .set_messages("c1", MessagePage::new(vec![msg("m1", "a")]));

    assert!(!session.delete_message("m1").await);
    assert_eq!(session.messages().map(|p| p.total), Some(1));
    assert_eq!(
        session.ui_error().map(|e| e.source()),
        Some(ErrorSource::DeleteMessage)
    );
}

#[tokio::test]
async fn test_generate_ai_response() {
    let mut api = MockChatApi::new();
    api.expect_generate_ai_response()
        .times(1)
        .withf(|id, participant| id == "c1" && participant == "p9")
        .returning(|_, _| {
            Ok(Message::new("c1", "a1", SenderType::Assistant, "The tavern falls quiet.")
                .with_id("m9"))
        });

    let session = setup_session(api, disconnected_transport());
    assert!(session.generate_ai_response("p9").await);
    let page = session.messages().expect("page");
    assert_eq!(page.items[0].sender_type(), SenderType::Assistant);
}

#[tokio::test]
async fn test_add_participant_refreshes_conversation() {
    let mut api = MockChatApi::new();
    api.expect_add_participant()
        .times(1)
        .withf(|id, character| id == "c1" && character == "ch1")
        .returning(|_, _| Ok(()));
    api.expect_get_conversation()
        .times(1)
        .returning(|_| Ok(conversation()));

    let session = setup_session(api, disconnected_transport());
    session.cache().set_conversation(Conversation::new("c1"));
    assert!(session.participants().is_empty());

    assert!(session.add_participant("ch1").await);
    assert_eq!(session.participants().len(), 2);
    assert!(!session.cache().is_stale(&CacheKey::Conversation("c1".into())));
    assert!(session.cache().is_stale(&CacheKey::Conversations));
}

#[tokio::test]
async fn test_remove_participant_failure() {
    let mut api = MockChatApi::new();
    api.expect_remove_participant()
        .times(1)
        .returning(|_, _| Err(eyre::eyre!("not found")));
    api.expect_get_conversation().times(0);

    let session = setup_session(api, disconnected_transport());
    assert!(!session.remove_participant("p2").await);
    assert_eq!(
        session.ui_error().map(|e| e.source()),
        Some(ErrorSource::RemoveParticipant)
    );
}

#[tokio::test]
async fn test_update_settings() {
    let mut api = MockChatApi::new();
    api.expect_update_conversation_settings()
        .times(1)
        .returning(|_, settings| Ok(Conversation::new("c1").with_settings(settings)));

    let session = setup_session(api, disconnected_transport());
    let mut settings = ConversationSettings::default();
    settings.set("background", "forest.png").unwrap();
    assert!(session.update_settings(settings).await);

    let convo = session.conversation().expect("conversation cached");
    assert_eq!(convo.settings().background.as_deref(), Some("forest.png"));
    assert!(session.cache().is_stale(&CacheKey::Conversations));
}

#[tokio::test]
async fn test_latest_error_wins_and_success_clears() {
    let mut api = MockChatApi::new();
    api.expect_delete_message()
        .times(1)
        .returning(|_, _| Err(eyre::eyre!("delete failed")));
    api.expect_generate_ai_response()
        .times(1)
        .returning(|_, _| Err(eyre::eyre!("generation failed")));
    api.expect_send_message()
        .times(1)
        .returning(|_, _| Ok(msg("m1", "ok")));

    let session = setup_session(api, disconnected_transport());
    assert!(!session.delete_message("m1").await);
    assert!(!session.generate_ai_response("p9").await);

    let err = session.ui_error().expect("error");
    assert_eq!(err.source(), ErrorSource::GenerateResponse);
    assert_eq!(session.recent_errors().len(), 2);

    assert!(session.send_message("ok").await);
    assert!(session.ui_error().is_none());
    assert_eq!(session.recent_errors().len(), 2);
}

#[tokio::test]
async fn test_load() {
    let mut api = MockChatApi::new();
    api.expect_get_conversation()
        .times(1)
        .returning(|_| Ok(conversation()));
    api.expect_list_messages().times(1).returning(|_| {
        Ok(MessagePage {
            items: vec![msg("m1", "a")],
            total: 30,
        })
    });

    let mut transport = disconnected_transport();
    transport
        .expect_typing_participants()
        .return_const(vec!["a1".to_string(), "ghost".to_string()]);

    let session = setup_session(api, transport);
    assert!(session.load().await);
    assert_eq!(session.messages().map(|p| p.total), Some(30));
    assert_eq!(
        session.resolve_sender("u1").map(|p| p.display_name),
        Some("Kim".to_string())
    );
    assert_eq!(
        session.resolve_sender("p9").map(|p| p.display_name),
        Some("Narrator".to_string())
    );
    assert_eq!(session.typing_names(), vec!["Narrator".to_string()]);
}

#[tokio::test]
async fn test_load_failure() {
    let mut api = MockChatApi::new();
    api.expect_get_conversation()
        .returning(|_| Err(eyre::eyre!("offline")));
    api.expect_list_messages()
        .returning(|_| Ok(MessagePage::default()));

    let session = setup_session(api, disconnected_transport());
    assert!(!session.load().await);
    assert_eq!(
        session.ui_error().map(|e| e.source()),
        Some(ErrorSource::Load)
    );
    assert!(session.conversation().is_none());
}

#[tokio::test]
async fn test_echo_for_other_conversation_is_ignored() {
    let session = setup_session(MockChatApi::new(), disconnected_transport());
    let other = Message::new("c2", "p1", SenderType::User, "elsewhere");
    assert!(!session.handle_event(&TransportEvent::MessageReceived(other)));
    assert!(session.messages().is_none());
}

#[tokio::test]
async fn test_dispose() {
    let mut transport = disconnected_transport();
    transport.expect_close().times(1).returning(|| ());

    let session = setup_session(MockChatApi::new(), transport);
    session.cache().set_conversation(conversation());
    session.handle_event(&TransportEvent::MessageReceived(msg("m1", "a")));

    session.dispose().await;
    assert!(session.conversation().is_none());
    assert!(session.messages().is_none());
}

/// Send endpoint whose first call can be held open.
struct SlowApi {
    calls: AtomicUsize,
    gate: Notify,
    hold_first: bool,
    delay_first: Option<time::Duration>,
}

impl SlowApi {
    fn gated() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
            hold_first: true,
            delay_first: None,
        }
    }

    fn delayed(delay: time::Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
            hold_first: false,
            delay_first: Some(delay),
        }
    }
}

#[async_trait]
impl ChatApi for SlowApi {
    async fn get_conversation(&self, _conversation_id: &str) -> Result<Conversation> {
        eyre::bail!("unsupported")
    }

    async fn list_messages(&self, _conversation_id: &str) -> Result<MessagePage> {
        eyre::bail!("unsupported")
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            if self.hold_first {
                self.gate.notified().await;
            }
            if let Some(delay) = self.delay_first {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(Message::new(conversation_id, "p1", SenderType::User, content).with_id(content))
    }

    async fn delete_message(&self, _conversation_id: &str, _message_id: &str) -> Result<()> {
        eyre::bail!("unsupported")
    }

    async fn generate_ai_response(
        &self,
        _conversation_id: &str,
        _participant_id: &str,
    ) -> Result<Message> {
        eyre::bail!("unsupported")
    }

    async fn add_participant(
        &self,
        _conversation_id: &str,
        _acting_character_id: &str,
    ) -> Result<()> {
        eyre::bail!("unsupported")
    }

    async fn remove_participant(
        &self,
        _conversation_id: &str,
        _participant_id: &str,
    ) -> Result<()> {
        eyre::bail!("unsupported")
    }

    async fn update_conversation_settings(
        &self,
        _conversation_id: &str,
        _settings: ConversationSettings,
    ) -> Result<Conversation> {
        eyre::bail!("unsupported")
    }
}

fn cached_ids(session: &Session) -> Vec<String> {
    session
        .messages()
        .map(|p| p.items.iter().map(|m| m.id().to_string()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_reject_if_busy() {
    let api = Arc::new(SlowApi::gated());
    let session = Arc::new(
        Session::new(
            "c1",
            "u1",
            api.clone(),
            Arc::new(Disconnected::default()),
            Arc::new(QueryCache::new()),
        )
        .with_policy(SendPolicy::RejectIfBusy),
    );

    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.send_message("first").await })
    };
    while api.calls.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(time::Duration::from_millis(5)).await;
    }

    assert!(!session.send_message("second").await);
    assert_eq!(
        session.ui_error().map(|e| e.source()),
        Some(ErrorSource::SendMessage)
    );

    api.gate.notify_one();
    assert!(first.await.expect("send task"));
    assert_eq!(cached_ids(&session), vec!["first"]);

    // The guard is released once the send completes.
    assert!(session.send_message("third").await);
    assert_eq!(cached_ids(&session), vec!["first", "third"]);
}

#[tokio::test]
async fn test_serialize_keeps_call_order() {
    let api = Arc::new(SlowApi::delayed(time::Duration::from_millis(50)));
    let session = Session::new(
        "c1",
        "u1",
        api,
        Arc::new(Disconnected::default()),
        Arc::new(QueryCache::new()),
    )
    .with_policy(SendPolicy::Serialize);

    let (a, b) = tokio::join!(session.send_message("first"), session.send_message("second"));
    assert!(a && b);
    assert_eq!(cached_ids(&session), vec!["first", "second"]);
}

#[tokio::test]
async fn test_race_appends_in_completion_order() {
    let api = Arc::new(SlowApi::delayed(time::Duration::from_millis(50)));
    let session = Session::new(
        "c1",
        "u1",
        api,
        Arc::new(Disconnected::default()),
        Arc::new(QueryCache::new()),
    )
    .with_policy(SendPolicy::Race);

    let (a, b) = tokio::join!(session.send_message("first"), session.send_message("second"));
    assert!(a && b);
    assert_eq!(cached_ids(&session), vec!["second", "first"]);
}
