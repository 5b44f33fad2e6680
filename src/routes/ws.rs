//! Websocket plumbing shared by the whiteboard and chat relays.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade, then admit: verify the `token` query parameter and resolve
//!    the caller's role for the room's team or project. On failure send one
//!    `error` frame and close.
//! 2. The surface-specific session registers in its room.
//! 3. `pump` runs a `select!` loop: inbound text goes to the session,
//!    frames queued by room broadcasts go out to the socket. The queue keeps
//!    draining while the session handles a frame.
//! 4. On close or read error the session deregisters.

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::{self, ErrorFrame};
use crate::room::Outbound;
use crate::services::membership;
use crate::services::roles::ROLE_VIEWER;
use crate::state::AppState;

pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// Query parameters on both realtime upgrade endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub token: String,
    pub name: Option<String>,
}

impl ConnectParams {
    /// Caller-supplied display name, or the anonymous default.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME)
            .to_owned()
    }
}

/// Authenticated identity of one connection, resolved once at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub name: String,
}

/// What the connection must be a member of.
#[derive(Debug, Clone, Copy)]
pub enum Scope {
    Team(Uuid),
    Project(Uuid),
}

/// Why a connection was turned away. The string is the error frame message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Unauthorized,
    Forbidden,
}

impl Rejection {
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
        }
    }
}

/// A relay surface driven by `pump`.
pub(crate) trait Session {
    fn on_text(&mut self, text: &str) -> impl Future<Output = ()> + Send;
}

/// Verify the token and the caller's membership for `scope`.
pub(crate) async fn admit(state: &AppState, params: &ConnectParams, scope: Scope) -> Result<Identity, Rejection> {
    let user_id = match state.tokens.verify(&params.token) {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, ?scope, "ws: authentication failed");
            return Err(Rejection::Unauthorized);
        }
    };

    let access = match scope {
        Scope::Team(team_id) => membership::require_team_role(&*state.members, team_id, user_id, ROLE_VIEWER).await,
        Scope::Project(project_id) => {
            membership::require_project_role(&*state.members, project_id, user_id, ROLE_VIEWER).await
        }
    };
    if let Err(e) = access {
        warn!(error = %e, %user_id, ?scope, "ws: authorization failed");
        return Err(Rejection::Forbidden);
    }

    Ok(Identity { user_id, name: params.display_name() })
}

/// Send a single error frame and close.
pub(crate) async fn reject(mut socket: WebSocket, rejection: Rejection) {
    if let Some(text) = frame::encode(&ErrorFrame::new(rejection.message())) {
        let _ = socket.send(Message::Text(text.as_ref().into())).await;
    }
    let _ = socket.send(Message::Close(None)).await;
}

/// Relay between the socket and the session until either side ends.
pub(crate) async fn pump<S: Session>(socket: &mut WebSocket, rx: &mut mpsc::Receiver<Outbound>, session: &mut S) {
    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    Ok(Message::Text(text)) => {
                        if !handle_text(socket, rx, session, text.as_str()).await {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        log_close(frame.as_ref());
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "ws: receive failed");
                        break;
                    }
                }
            }
            Some(out) = rx.recv() => {
                if !forward(socket, &out).await {
                    break;
                }
            }
        }
    }
}

/// Run one inbound frame through the session while still draining the
/// outbound queue, so a slow chat insert cannot back up frames for this
/// connection. Returns `false` once the socket can no longer be written.
async fn handle_text<S: Session>(
    socket: &mut WebSocket,
    rx: &mut mpsc::Receiver<Outbound>,
    session: &mut S,
    text: &str,
) -> bool {
    let handled = session.on_text(text);
    tokio::pin!(handled);
    loop {
        tokio::select! {
            () = &mut handled => return true,
            Some(out) = rx.recv() => {
                if !forward(socket, &out).await {
                    return false;
                }
            }
        }
    }
}

async fn forward(socket: &mut WebSocket, out: &Outbound) -> bool {
    socket.send(Message::Text(out.as_ref().into())).await.is_ok()
}

fn log_close(frame: Option<&CloseFrame>) {
    let Some(frame) = frame else { return };
    if !matches!(frame.code, close_code::NORMAL | close_code::AWAY) {
        info!(code = frame.code, reason = frame.reason.as_str(), "ws: closed with unexpected code");
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
