//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Two realtime websocket endpoints (whiteboard relay, team chat) plus the
//! REST endpoints for chat history, whiteboard snapshots, and roles. REST
//! callers authenticate with a bearer JWT; websocket callers pass the same
//! token in the `token` query parameter.

pub mod auth;
pub mod chat;
pub mod members;
pub mod whiteboard;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/whiteboard/{board_id}", get(whiteboard::whiteboard_ws))
        .route("/ws/team/{team_id}/chat", get(chat::chat_ws))
        .route("/api/teams/{team_id}/chat", get(chat::list_chat))
        .route("/api/teams/{team_id}/role", get(members::team_role))
        .route(
            "/api/teams/{team_id}/members/{user_id}",
            put(members::update_member).delete(members::delete_member),
        )
        .route("/api/projects/{project_id}/role", get(members::project_role))
        .route(
            "/api/projects/{project_id}/whiteboard",
            get(whiteboard::get_whiteboard).put(whiteboard::save_whiteboard),
        )
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
