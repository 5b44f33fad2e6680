//! Team chat relay and history routes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Json, Response};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::frame::{self, ChatCommand, ChatEvent};
use crate::room::{CLIENT_QUEUE_CAPACITY, Client, Outbound, Registry, Room};
use crate::routes::auth::AuthUser;
use crate::routes::members::access_error_to_status;
use crate::routes::ws::{self, ConnectParams, Identity, Scope, Session};
use crate::services::chat::{self, ChatMessage, ChatStore};
use crate::state::AppState;

// =============================================================================
// REALTIME
// =============================================================================

/// `GET /ws/team/:teamId/chat?token=&name=` — join a team's chat room.
pub async fn chat_ws(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Query(params): Query<ConnectParams>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| run(socket, state, team_id, params))
}

async fn run(mut socket: WebSocket, state: AppState, team_id: Uuid, params: ConnectParams) {
    let identity = match ws::admit(&state, &params, Scope::Team(team_id)).await {
        Ok(identity) => identity,
        Err(rejection) => {
            ws::reject(socket, rejection).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
    let mut session = ChatSession::open(
        Arc::clone(&state.chat_rooms),
        Arc::clone(&state.chat),
        state.chat_persist_timeout,
        team_id,
        identity,
        tx,
    )
    .await;
    ws::pump(&mut socket, &mut rx, &mut session).await;
    session.close().await;
}

/// One connection's membership in a team chat room.
pub(crate) struct ChatSession {
    registry: Arc<Registry>,
    store: Arc<dyn ChatStore>,
    persist_timeout: Duration,
    team_id: Uuid,
    key: String,
    room: Arc<Room>,
    client_id: Uuid,
    identity: Identity,
}

impl ChatSession {
    /// Register in the team's room and broadcast the new presence list.
    pub(crate) async fn open(
        registry: Arc<Registry>,
        store: Arc<dyn ChatStore>,
        persist_timeout: Duration,
        team_id: Uuid,
        identity: Identity,
        tx: mpsc::Sender<Outbound>,
    ) -> Self {
        let key = team_id.to_string();
        let client_id = Uuid::new_v4();
        let client = Client { user_id: identity.user_id, name: identity.name.clone(), tx };
        let room = registry.join(&key, client_id, client).await;

        let session = Self { registry, store, persist_timeout, team_id, key, room, client_id, identity };
        session.broadcast_presence().await;
        info!(%team_id, %client_id, user_id = %session.identity.user_id, "chat: session opened");
        session
    }

    /// Deregister and broadcast the updated presence list.
    pub(crate) async fn close(self) {
        self.registry.leave(&self.key, &self.room, self.client_id).await;
        self.broadcast_presence().await;
        info!(team_id = %self.team_id, client_id = %self.client_id, "chat: session closed");
    }

    async fn broadcast_presence(&self) {
        let presence = ChatEvent::Presence { users: self.room.participants().await };
        if let Some(out) = frame::encode(&presence) {
            self.room.broadcast_all(&out).await;
        }
    }

    async fn post_message(&self, content: &str) {
        let Some(message) = ChatMessage::compose(self.team_id, self.identity.user_id, &self.identity.name, content)
        else {
            debug!(client_id = %self.client_id, chars = content.chars().count(), "chat: dropped invalid message");
            return;
        };

        // Broadcast regardless of the insert outcome; failures are logged there.
        chat::persist_message(&*self.store, &message, self.persist_timeout).await;

        if let Some(out) = frame::encode(&ChatEvent::Message { message }) {
            self.room.broadcast_all(&out).await;
        }
    }

    async fn typing(&self) {
        let event = ChatEvent::Typing { user_id: self.identity.user_id, name: self.identity.name.clone() };
        if let Some(out) = frame::encode(&event) {
            self.room.broadcast_others(self.client_id, &out).await;
        }
    }
}

impl Session for ChatSession {
    async fn on_text(&mut self, text: &str) {
        match serde_json::from_str::<ChatCommand>(text) {
            Ok(ChatCommand::Message { content }) => self.post_message(&content).await,
            Ok(ChatCommand::Typing) => self.typing().await,
            Err(e) => debug!(client_id = %self.client_id, error = %e, "chat: dropped unrecognized frame"),
        }
    }
}

// =============================================================================
// HISTORY
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<String>,
    pub before: Option<String>,
}

/// `GET /api/teams/:id/chat?limit=&before=` — a page of history, oldest first.
pub async fn list_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatMessage>>, StatusCode> {
    let limit = chat::history_limit(query.limit.as_deref());
    let before = query.before.as_deref().and_then(|raw| Uuid::parse_str(raw).ok());

    let messages = chat::list_history(&*state.members, &*state.chat, team_id, auth.user_id, limit, before)
        .await
        .map_err(access_error_to_status)?;

    Ok(Json(messages))
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
