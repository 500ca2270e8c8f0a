//! Client controller against a live server.

use std::time::Duration;

use watchparty::prelude::*;
use watchparty_client::{ClientConfig, ClientError, ClientEvent, PartyHandle, WatchPartyClient};
use watchparty_session::ReconnectPolicy;

// =========================================================================
// Helpers
// =========================================================================

async fn start_server_with(builder: WatchPartyServerBuilder) -> (String, RoomRegistry) {
    let server = builder.bind("127.0.0.1:0").without_http().build().await.unwrap();
    let url = format!("ws://{}", server.local_addr().unwrap());
    let registry = server.registry();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    (url, registry)
}

async fn start_server() -> (String, RoomRegistry) {
    start_server_with(WatchPartyServer::builder()).await
}

async fn new_room(registry: &RoomRegistry) -> RoomCode {
    registry
        .create_room(VideoRef::new("https://v/1", "Movie"))
        .await
        .unwrap()
}

fn fast_reconnect() -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        max_attempts: 5,
        ..ReconnectPolicy::default()
    }
}

/// Waits for the first event matching `pred`, skipping the rest.
async fn wait_for(party: &mut PartyHandle, pred: impl Fn(&ClientEvent) -> bool) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = party.next_event().await.expect("event stream ended");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn is_kind(kind: &'static str) -> impl Fn(&ClientEvent) -> bool {
    move |event| matches!(event, ClientEvent::Message(msg) if msg.kind() == kind)
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_join_builds_view_from_snapshot() {
    let (url, registry) = start_server().await;
    let code = new_room(&registry).await;
    let client = WatchPartyClient::new(ClientConfig::new(&url));

    let alice = client.join(code.clone(), UserId::new("alice"), "Alice").await.unwrap();
    let view = alice.view().await;
    assert_eq!(view.room_id(), &code);
    assert!(view.is_host());
    assert_eq!(view.participants().len(), 1);
    assert_eq!(view.video().title, "Movie");
}

#[tokio::test]
async fn test_host_play_updates_both_views() {
    let (url, registry) = start_server().await;
    let code = new_room(&registry).await;
    let client = WatchPartyClient::new(ClientConfig::new(&url));

    let alice = client.join(code.clone(), UserId::new("alice"), "Alice").await.unwrap();
    let mut bob = client.join(code, UserId::new("bob"), "Bob").await.unwrap();
    assert!(!bob.view().await.is_host());

    alice.play(30.0).await.unwrap();
    wait_for(&mut bob, is_kind("video-play-sync")).await;

    let bob_view = bob.view().await;
    assert!(bob_view.is_playing());
    assert!(bob_view.current_time() >= 30.0);
    assert!(alice.view().await.is_playing());
}

#[tokio::test]
async fn test_chat_arrives_in_view() {
    let (url, registry) = start_server().await;
    let code = new_room(&registry).await;
    let client = WatchPartyClient::new(ClientConfig::new(&url));

    let mut alice = client.join(code, UserId::new("alice"), "Alice").await.unwrap();
    alice.send_message("popcorn ready").await.unwrap();

    wait_for(&mut alice, |event| {
        matches!(event, ClientEvent::Message(ServerMessage::NewMessage(m)) if !m.is_system)
    })
    .await;
    let view = alice.view().await;
    let last = view.messages().last().unwrap();
    assert_eq!(last.text, "popcorn ready");
    assert_eq!(last.sender_name, "Alice");
}

#[tokio::test]
async fn test_view_keeps_only_recent_chat() {
    let (url, registry) = start_server().await;
    let code = new_room(&registry).await;
    let client = WatchPartyClient::new(ClientConfig::new(&url).chat_history(3));

    let mut alice = client.join(code, UserId::new("alice"), "Alice").await.unwrap();
    for i in 0..10 {
        alice.send_message(format!("line {i}")).await.unwrap();
    }
    wait_for(&mut alice, |event| {
        matches!(event, ClientEvent::Message(ServerMessage::NewMessage(m)) if m.text == "line 9")
    })
    .await;

    let view = alice.view().await;
    let texts: Vec<&str> = view.messages().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["line 7", "line 8", "line 9"]);
}

#[tokio::test]
async fn test_join_unknown_room_is_rejected() {
    let (url, _) = start_server().await;
    let client = WatchPartyClient::new(ClientConfig::new(&url));

    let result = client
        .join(RoomCode::parse("ZZZZZZ").unwrap(), UserId::new("alice"), "Alice")
        .await;
    assert!(matches!(
        result,
        Err(ClientError::JoinRejected { code: ErrorCode::RoomNotFound, .. })
    ));
}

#[tokio::test]
async fn test_react_refused_locally_when_disabled() {
    let (url, registry) = start_server().await;
    let code = new_room(&registry).await;
    let client = WatchPartyClient::new(ClientConfig::new(&url).enable_reactions(false));

    let alice = client.join(code, UserId::new("alice"), "Alice").await.unwrap();
    assert!(matches!(alice.react("🎉").await, Err(ClientError::ReactionsDisabled)));
}

#[tokio::test]
async fn test_leave_removes_participant() {
    let (url, registry) = start_server().await;
    let code = new_room(&registry).await;
    let client = WatchPartyClient::new(ClientConfig::new(&url));

    let alice = client.join(code.clone(), UserId::new("alice"), "Alice").await.unwrap();
    let mut bob = client.join(code.clone(), UserId::new("bob"), "Bob").await.unwrap();

    alice.leave().await.unwrap();
    wait_for(&mut bob, is_kind("host-changed")).await;
    assert!(bob.view().await.is_host());

    bob.leave().await.unwrap();
    let destroyed = tokio::time::timeout(Duration::from_secs(5), async {
        while registry.get_room(&code).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(destroyed.is_ok(), "room outlived its last participant");
}

#[tokio::test]
async fn test_driver_rejoins_after_server_drops_connection() {
    let (url, registry) =
        start_server_with(WatchPartyServer::builder().idle_timeout(Duration::from_millis(200)))
            .await;
    let code = new_room(&registry).await;
    let config = ClientConfig::new(&url)
        .heartbeat_interval(Duration::from_secs(60))
        .reconnect(fast_reconnect());
    let client = WatchPartyClient::new(config);

    let mut alice = client.join(code.clone(), UserId::new("alice"), "Alice").await.unwrap();

    let event = wait_for(&mut alice, |e| matches!(e, ClientEvent::Reconnecting { .. })).await;
    assert!(matches!(event, ClientEvent::Reconnecting { attempt: 1, .. }));
    wait_for(&mut alice, |e| *e == ClientEvent::Reconnected).await;

    let view = alice.view().await;
    assert!(view.is_host());
    assert_eq!(view.participants().len(), 1, "rejoin must not duplicate the participant");
    assert_eq!(registry.get_room(&code).await.unwrap().participant_count, 1);

    // The next outage counts attempts from one again.
    let event = wait_for(&mut alice, |e| matches!(e, ClientEvent::Reconnecting { .. })).await;
    assert!(matches!(event, ClientEvent::Reconnecting { attempt: 1, .. }));
    wait_for(&mut alice, |e| *e == ClientEvent::Reconnected).await;
}

#[tokio::test]
async fn test_disabled_reconnect_reports_connection_lost() {
    let (url, registry) =
        start_server_with(WatchPartyServer::builder().idle_timeout(Duration::from_millis(200)))
            .await;
    let code = new_room(&registry).await;
    let config = ClientConfig::new(&url)
        .heartbeat_interval(Duration::from_secs(60))
        .reconnect(ReconnectPolicy::disabled());
    let client = WatchPartyClient::new(config);

    let mut alice = client.join(code, UserId::new("alice"), "Alice").await.unwrap();
    wait_for(&mut alice, |e| *e == ClientEvent::ConnectionLost).await;
    // The event stream closes once the driver has stopped.
    while alice.next_event().await.is_some() {}

    assert!(matches!(
        alice.send_message("anyone?").await,
        Err(ClientError::ConnectionLost)
    ));
    alice.leave().await.unwrap();
}

#[tokio::test]
async fn test_heartbeats_keep_idle_connection_open() {
    let (url, registry) =
        start_server_with(WatchPartyServer::builder().idle_timeout(Duration::from_millis(300)))
            .await;
    let code = new_room(&registry).await;
    let config = ClientConfig::new(&url)
        .heartbeat_interval(Duration::from_millis(50))
        .reconnect(ReconnectPolicy::disabled());
    let client = WatchPartyClient::new(config);

    let mut alice = client.join(code, UserId::new("alice"), "Alice").await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_millis(800), async {
        loop {
            match alice.next_event().await {
                Some(ClientEvent::ConnectionLost) | None => return,
                Some(_) => continue,
            }
        }
    })
    .await;
    assert!(outcome.is_err(), "connection should have stayed up");
}
