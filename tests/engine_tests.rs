mod common;

use std::time::Duration;

use colab_sync::client::SyncClient;
use colab_sync::config::SyncConfig;
use colab_sync::error::SyncError;
use colab_sync::models::{
    EventPayload, Participant, ParticipantRole, PresencePatch, SessionEvent, SessionOptions,
    WireMessage,
};
use colab_sync::profile::{FileProfileStore, ProfileStore, StoredProfile};

use common::MockTransport;

fn user(id: &str, role: ParticipantRole) -> Participant {
    Participant::new(id, id, format!("{}@example.com", id), role)
}

fn client_with(transport: &MockTransport, config: SyncConfig) -> SyncClient {
    let (client, _rx) = SyncClient::new(config, Box::new(transport.clone()));
    client
}

fn no_retry_config() -> SyncConfig {
    SyncConfig {
        auto_reconnect: false,
        presence_debounce_ms: 10,
        ..Default::default()
    }
}

#[tokio::test]
async fn create_session_requires_a_current_user() {
    let transport = MockTransport::new();
    let mut client = client_with(&transport, no_retry_config());
    let err = client.create_session("demo", SessionOptions::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::State(_)));
}

#[tokio::test]
async fn join_session_requires_an_active_transport() {
    let transport = MockTransport::new();
    let mut client = client_with(&transport, no_retry_config());
    client.set_current_user(user("me", ParticipantRole::Editor));

    // Build a session snapshot as the relay would hand it over.
    let session = {
        let other = MockTransport::new();
        let mut owner_client = client_with(&other, no_retry_config());
        owner_client.set_current_user(user("owner", ParticipantRole::Owner));
        owner_client.create_session("demo", SessionOptions::default()).await.unwrap()
    };

    let err = client.join_session(session).await.unwrap_err();
    assert!(matches!(err, SyncError::State(_)));
}

#[tokio::test]
async fn events_created_offline_flush_on_connect_in_order() {
    let transport = MockTransport::new();
    let mut client = client_with(&transport, no_retry_config());
    client.set_current_user(user("me", ParticipantRole::Owner));

    // Session creation and two chat messages while disconnected: three
    // pending events, nothing on the wire yet.
    client.create_session("demo", SessionOptions::default()).await.unwrap();
    client.send_chat_message("first").await.unwrap();
    client.send_chat_message("second").await.unwrap();
    assert!(transport.sent().is_empty());

    client.connect().await.unwrap();

    let versions: Vec<u64> = transport
        .sent()
        .iter()
        .filter_map(|m| match m {
            WireMessage::Event { event } => Some(event.version),
            _ => None,
        })
        .collect();
    assert_eq!(versions, vec![1, 2, 3], "flushed in submission order, each exactly once");
}

#[tokio::test]
async fn run_processes_inbound_events_until_stream_ends() {
    let transport = MockTransport::new();
    let mut client = client_with(&transport, no_retry_config());
    client.set_current_user(user("me", ParticipantRole::Owner));

    client.connect().await.unwrap();
    let session = client.create_session("demo", SessionOptions::default()).await.unwrap();

    transport.feed(WireMessage::Event {
        event: SessionEvent::new(
            session.id.clone(),
            "guest",
            2,
            EventPayload::UserJoined { user: user("guest", ParticipantRole::Editor) },
        ),
    });
    transport.feed(WireMessage::Event {
        event: SessionEvent::new(
            session.id.clone(),
            "guest",
            3,
            EventPayload::TypingStart { user_id: "guest".to_string() },
        ),
    });
    transport.close_peer();

    // auto_reconnect is off, so run returns once the stream ends.
    tokio::time::timeout(Duration::from_secs(5), client.run())
        .await
        .expect("run should return after the peer closes")
        .unwrap();

    let guest = client
        .participants()
        .into_iter()
        .find(|p| p.id == "guest")
        .expect("guest joined");
    assert!(guest.is_typing);
}

#[tokio::test]
async fn presence_updates_debounce_into_a_single_broadcast() {
    let transport = MockTransport::new();
    let mut client = client_with(&transport, no_retry_config());
    client.set_current_user(user("me", ParticipantRole::Owner));
    client.connect().await.unwrap();
    client.create_session("demo", SessionOptions::default()).await.unwrap();

    for i in 0..5 {
        client
            .update_presence(PresencePatch {
                cursor: Some(colab_sync::models::CursorPosition { x: i as f64, y: 0.0 }),
                ..Default::default()
            })
            .unwrap();
    }
    // Window still open: nothing due yet.
    client.flush_presence().await;
    let presence_frames = |t: &MockTransport| {
        t.sent()
            .iter()
            .filter(|m| matches!(m, WireMessage::PresenceUpdate { .. }))
            .count()
    };
    assert_eq!(presence_frames(&transport), 0);

    tokio::time::sleep(Duration::from_millis(30)).await;
    client.flush_presence().await;
    assert_eq!(presence_frames(&transport), 1);

    // No further broadcast without a new update.
    client.flush_presence().await;
    assert_eq!(presence_frames(&transport), 1);
}

#[tokio::test]
async fn identity_restores_from_the_profile_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    let store = FileProfileStore::new(path.clone());
    store
        .save(&StoredProfile {
            user: user("me", ParticipantRole::Owner),
            last_session_id: None,
            preferred_settings: None,
        })
        .await
        .unwrap();

    let transport = MockTransport::new();
    let mut client = client_with(&transport, no_retry_config());
    client.set_profile_store(Box::new(FileProfileStore::new(path)));

    let restored = client.restore_identity().await.unwrap().expect("profile present");
    assert_eq!(restored.id, "me");
    assert_eq!(client.current_user().unwrap().id, "me");
}

#[tokio::test]
async fn leaving_drops_the_session() {
    let transport = MockTransport::new();
    let mut client = client_with(&transport, no_retry_config());
    client.set_current_user(user("me", ParticipantRole::Owner));
    client.connect().await.unwrap();
    client.create_session("demo", SessionOptions::default()).await.unwrap();
    assert!(client.session().is_some());

    client.leave_session().await.unwrap();
    assert!(client.session().is_none());
    assert!(transport
        .sent_kinds()
        .contains(&"LEAVE_SESSION"));

    let err = client.send_chat_message("late").await.unwrap_err();
    assert!(matches!(err, SyncError::State(_)));
}
