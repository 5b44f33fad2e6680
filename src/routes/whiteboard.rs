//! Whiteboard relay and snapshot routes.
//!
//! DESIGN
//! ======
//! One room per board, keyed by board id (the project id). The relay never
//! interprets drawing payloads: any JSON object a client sends is stamped
//! with the sender's identity and forwarded to every other connection in the
//! room. Durable state is the snapshot blob saved over REST.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Json, Response};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::frame::{self, RelayFrame, WhiteboardEvent};
use crate::room::{CLIENT_QUEUE_CAPACITY, Client, Outbound, Registry, Room};
use crate::routes::auth::AuthUser;
use crate::routes::members::access_error_to_status;
use crate::routes::ws::{self, ConnectParams, Identity, Scope, Session};
use crate::services::whiteboard;
use crate::state::AppState;

// =============================================================================
// REALTIME
// =============================================================================

/// `GET /ws/whiteboard/:boardId?token=&name=` — join a board's relay.
pub async fn whiteboard_ws(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
    Query(params): Query<ConnectParams>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| run(socket, state, board_id, params))
}

async fn run(mut socket: axum::extract::ws::WebSocket, state: AppState, board_id: Uuid, params: ConnectParams) {
    let identity = match ws::admit(&state, &params, Scope::Project(board_id)).await {
        Ok(identity) => identity,
        Err(rejection) => {
            ws::reject(socket, rejection).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
    let mut session = WhiteboardSession::open(Arc::clone(&state.whiteboard_rooms), board_id, identity, tx).await;
    ws::pump(&mut socket, &mut rx, &mut session).await;
    session.close().await;
}

/// One connection's membership in a board room.
pub(crate) struct WhiteboardSession {
    registry: Arc<Registry>,
    key: String,
    room: Arc<Room>,
    client_id: Uuid,
    identity: Identity,
}

impl WhiteboardSession {
    /// Register in the board's room, announce the joiner to everyone else,
    /// and send the joiner the current user list.
    pub(crate) async fn open(
        registry: Arc<Registry>,
        board_id: Uuid,
        identity: Identity,
        tx: mpsc::Sender<Outbound>,
    ) -> Self {
        let key = board_id.to_string();
        let client_id = Uuid::new_v4();
        let client = Client { user_id: identity.user_id, name: identity.name.clone(), tx };
        let room = registry.join(&key, client_id, client).await;

        let users = room.participants().await;
        let joined = WhiteboardEvent::Join {
            user_id: identity.user_id,
            name: identity.name.clone(),
            users: users.clone(),
        };
        if let Some(out) = frame::encode(&joined) {
            room.broadcast_others(client_id, &out).await;
        }
        if let Some(out) = frame::encode(&WhiteboardEvent::Users { users }) {
            room.send_to(client_id, &out).await;
        }

        info!(%board_id, %client_id, user_id = %identity.user_id, "whiteboard: session opened");
        Self { registry, key, room, client_id, identity }
    }

    /// Deregister and tell the remaining connections who left.
    pub(crate) async fn close(self) {
        self.registry.leave(&self.key, &self.room, self.client_id).await;

        let left = WhiteboardEvent::Leave {
            user_id: self.identity.user_id,
            name: self.identity.name.clone(),
            users: self.room.participants().await,
        };
        if let Some(out) = frame::encode(&left) {
            self.room.broadcast_all(&out).await;
        }
        info!(board = %self.key, client_id = %self.client_id, "whiteboard: session closed");
    }
}

impl Session for WhiteboardSession {
    async fn on_text(&mut self, text: &str) {
        let Some(relay) = RelayFrame::parse(text, self.identity.user_id, &self.identity.name) else {
            debug!(client_id = %self.client_id, "whiteboard: dropped non-object frame");
            return;
        };
        if let Some(out) = frame::encode(&relay) {
            self.room.broadcast_others(self.client_id, &out).await;
        }
    }
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

#[derive(Debug, Serialize)]
pub struct WhiteboardResponse {
    pub id: Option<Uuid>,
    pub project_id: Uuid,
    pub data: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct SaveWhiteboardBody {
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct SavedWhiteboardResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// `GET /api/projects/:id/whiteboard` — latest snapshot, or an empty one.
pub async fn get_whiteboard(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<WhiteboardResponse>, StatusCode> {
    let snapshot = whiteboard::get_snapshot(&*state.members, &*state.whiteboards, project_id, auth.user_id)
        .await
        .map_err(access_error_to_status)?;

    Ok(Json(match snapshot {
        Some(board) => WhiteboardResponse {
            id: Some(board.id),
            project_id,
            data: board.data,
            updated_at: Some(board.updated_at),
        },
        None => WhiteboardResponse { id: None, project_id, data: String::new(), updated_at: None },
    }))
}

/// `PUT /api/projects/:id/whiteboard` — overwrite the snapshot.
pub async fn save_whiteboard(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(body): Json<SaveWhiteboardBody>,
) -> Result<Json<SavedWhiteboardResponse>, StatusCode> {
    let saved = whiteboard::save_snapshot(&*state.members, &*state.whiteboards, project_id, auth.user_id, &body.data)
        .await
        .map_err(access_error_to_status)?;

    Ok(Json(SavedWhiteboardResponse { id: saved.id, project_id, updated_at: saved.updated_at }))
}

#[cfg(test)]
#[path = "whiteboard_test.rs"]
mod tests;
