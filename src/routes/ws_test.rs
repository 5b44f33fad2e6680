use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::{Duration, Instant, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::*;
use crate::room::Registry;
use crate::services::auth::TokenVerifier;
use crate::services::chat::MAX_CONTENT_CHARS;
use crate::services::roles::{ROLE_EDITOR, ROLE_VIEWER};
use crate::state::test_helpers::{MemoryStore, TEST_SECRET, test_app_state, token_for};

type TestSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, crate::routes::app(state)).await.expect("test server failed");
    });
    addr
}

async fn connect(addr: SocketAddr, path: &str, token: &str, name: &str) -> TestSocket {
    let url = format!("ws://{addr}{path}?token={token}&name={name}");
    let (socket, _response) = connect_async(url).await.expect("websocket handshake");
    socket
}

/// Next text frame as JSON, skipping control frames.
async fn next_json(socket: &mut TestSocket) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("frame receive timed out")
            .expect("socket closed unexpectedly")
            .expect("websocket error");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame should be json");
        }
    }
}

/// Wait for the server to close the connection.
async fn expect_closed(socket: &mut TestSocket) {
    loop {
        match timeout(Duration::from_secs(2), socket.next()).await.expect("close timed out") {
            None | Some(Err(_) | Ok(WsMessage::Close(_))) => return,
            Some(Ok(WsMessage::Text(text))) => panic!("unexpected frame after rejection: {}", text.as_str()),
            Some(Ok(_)) => {}
        }
    }
}

async fn wait_until_evicted(registry: &Registry, key: &str) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while registry.contains(key).await {
        assert!(Instant::now() < deadline, "room {key} was not evicted");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn project_with_member(store: &MemoryStore, user_id: Uuid, flags: i32) -> Uuid {
    let (team, project) = (Uuid::new_v4(), Uuid::new_v4());
    store.add_project(project, Some(team));
    store.add_team_member(team, user_id, flags);
    project
}

// =============================================================================
// CONNECT PARAMS
// =============================================================================

#[test]
fn display_name_defaults_to_anonymous() {
    assert_eq!(ConnectParams::default().display_name(), DEFAULT_DISPLAY_NAME);
    let blank = ConnectParams { token: String::new(), name: Some("   ".into()) };
    assert_eq!(blank.display_name(), DEFAULT_DISPLAY_NAME);
    let named = ConnectParams { token: String::new(), name: Some(" Ada ".into()) };
    assert_eq!(named.display_name(), "Ada");
}

// =============================================================================
// ADMISSION
// =============================================================================

#[tokio::test]
async fn admit_resolves_identity_for_team_member() {
    let (state, store) = test_app_state();
    let (team, user) = (Uuid::new_v4(), Uuid::new_v4());
    store.add_team_member(team, user, ROLE_VIEWER);
    let params = ConnectParams { token: token_for(user), name: Some("Ada".into()) };

    let identity = admit(&state, &params, Scope::Team(team)).await.expect("member is admitted");
    assert_eq!(identity, Identity { user_id: user, name: "Ada".into() });
}

#[tokio::test]
async fn admit_distinguishes_unauthorized_from_forbidden() {
    let (state, _store) = test_app_state();
    let missing = ConnectParams::default();
    assert_eq!(
        admit(&state, &missing, Scope::Team(Uuid::new_v4())).await,
        Err(Rejection::Unauthorized)
    );

    let stranger = ConnectParams { token: token_for(Uuid::new_v4()), name: None };
    assert_eq!(
        admit(&state, &stranger, Scope::Project(Uuid::new_v4())).await,
        Err(Rejection::Forbidden)
    );
}

#[tokio::test]
async fn bad_token_gets_unauthorized_frame_then_close() {
    let (state, _store) = test_app_state();
    let addr = spawn_server(state).await;

    let mut socket = connect(addr, &format!("/ws/team/{}/chat", Uuid::new_v4()), "garbage", "Eve").await;
    assert_eq!(next_json(&mut socket).await, json!({ "type": "error", "message": "unauthorized" }));
    expect_closed(&mut socket).await;
}

#[tokio::test]
async fn non_member_gets_forbidden_frame_then_close() {
    let (state, store) = test_app_state();
    let project = project_with_member(&store, Uuid::new_v4(), ROLE_EDITOR);
    let registry = Arc::clone(&state.whiteboard_rooms);
    let addr = spawn_server(state).await;

    let token = token_for(Uuid::new_v4());
    let mut socket = connect(addr, &format!("/ws/whiteboard/{project}"), &token, "Eve").await;
    assert_eq!(next_json(&mut socket).await, json!({ "type": "error", "message": "forbidden" }));
    expect_closed(&mut socket).await;
    assert_eq!(registry.room_count().await, 0);
}

// =============================================================================
// END TO END
// =============================================================================

#[tokio::test]
async fn whiteboard_relay_stamps_sender_identity() {
    let (state, store) = test_app_state();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let board = project_with_member(&store, alice, ROLE_EDITOR);
    store.add_project_member(board, bob, ROLE_VIEWER);
    let registry = Arc::clone(&state.whiteboard_rooms);
    let addr = spawn_server(state).await;
    let path = format!("/ws/whiteboard/{board}");

    let mut alice_ws = connect(addr, &path, &token_for(alice), "Alice").await;
    assert_eq!(next_json(&mut alice_ws).await["type"], "users");

    let mut bob_ws = connect(addr, &path, &token_for(bob), "Bob").await;
    let joined = next_json(&mut alice_ws).await;
    assert_eq!(joined["type"], "join");
    assert_eq!(joined["user_id"], json!(bob));
    assert_eq!(next_json(&mut bob_ws).await["type"], "users");

    let spoofed = json!({ "type": "cursor", "x": 10, "user_id": alice, "name": "Alice" });
    bob_ws
        .send(WsMessage::text(spoofed.to_string()))
        .await
        .expect("send relay frame");

    let relayed = next_json(&mut alice_ws).await;
    assert_eq!(relayed["type"], "cursor");
    assert_eq!(relayed["x"], 10);
    assert_eq!(relayed["user_id"], json!(bob));
    assert_eq!(relayed["name"], "Bob");

    bob_ws.close(None).await.expect("close bob");
    let left = next_json(&mut alice_ws).await;
    assert_eq!(left["type"], "leave");
    assert_eq!(left["user_id"], json!(bob));

    alice_ws.close(None).await.expect("close alice");
    wait_until_evicted(&registry, &board.to_string()).await;
}

#[tokio::test]
async fn chat_round_trip_over_socket() {
    let (state, store) = test_app_state();
    let (team, user) = (Uuid::new_v4(), Uuid::new_v4());
    store.add_team_member(team, user, ROLE_VIEWER);
    let registry = Arc::clone(&state.chat_rooms);
    let addr = spawn_server(state).await;

    let mut socket = connect(addr, &format!("/ws/team/{team}/chat"), &token_for(user), "Ada").await;
    let presence = next_json(&mut socket).await;
    assert_eq!(presence["type"], "presence");
    assert_eq!(presence["users"], json!([{ "user_id": user, "name": "Ada" }]));

    let too_long = json!({ "type": "message", "content": "x".repeat(MAX_CONTENT_CHARS + 1) });
    socket.send(WsMessage::text(too_long.to_string())).await.expect("send");
    let at_limit = json!({ "type": "message", "content": "y".repeat(MAX_CONTENT_CHARS) });
    socket.send(WsMessage::text(at_limit.to_string())).await.expect("send");

    let event = next_json(&mut socket).await;
    assert_eq!(event["type"], "message");
    assert_eq!(event["message"]["user_name"], "Ada");
    assert_eq!(event["message"]["content"].as_str().map(str::len), Some(MAX_CONTENT_CHARS));
    assert_eq!(store.stored_messages().len(), 1);

    socket.close(None).await.expect("close");
    wait_until_evicted(&registry, &team.to_string()).await;
}

#[tokio::test]
async fn queue_drains_while_message_is_persisting() {
    let store = Arc::new(MemoryStore::with_insert_delay(Duration::from_secs(5)));
    let state = AppState::new(Arc::clone(&store), TokenVerifier::new(TEST_SECRET), Duration::from_secs(1));
    let (team, alice, bob) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    store.add_team_member(team, alice, ROLE_VIEWER);
    store.add_team_member(team, bob, ROLE_VIEWER);
    let addr = spawn_server(state).await;
    let path = format!("/ws/team/{team}/chat");

    let mut alice_ws = connect(addr, &path, &token_for(alice), "Alice").await;
    assert_eq!(next_json(&mut alice_ws).await["type"], "presence");
    let mut bob_ws = connect(addr, &path, &token_for(bob), "Bob").await;
    assert_eq!(next_json(&mut alice_ws).await["type"], "presence");
    assert_eq!(next_json(&mut bob_ws).await["type"], "presence");

    let message = json!({ "type": "message", "content": "slow write" });
    alice_ws.send(WsMessage::text(message.to_string())).await.expect("send message");
    tokio::time::sleep(Duration::from_millis(50)).await;
    bob_ws.send(WsMessage::text(json!({ "type": "typing" }).to_string())).await.expect("send typing");

    let typing = timeout(Duration::from_millis(500), next_json(&mut alice_ws))
        .await
        .expect("typing should arrive before the persist deadline");
    assert_eq!(typing["type"], "typing");
    assert_eq!(typing["user_id"], json!(bob));

    let event = next_json(&mut alice_ws).await;
    assert_eq!(event["type"], "message");
    assert_eq!(event["message"]["content"], "slow write");
    assert!(store.stored_messages().is_empty());
}
