//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is built once at startup and injected into Axum handlers via
//! the `State` extractor. It owns the two room registries (whiteboard and
//! chat), the token verifier, and the storage seams. Nothing here is a
//! process-global, so tests can build as many isolated states as they need.

use std::sync::Arc;
use std::time::Duration;

use crate::room::Registry;
use crate::services::auth::TokenVerifier;
use crate::services::chat::ChatStore;
use crate::services::membership::MembershipStore;
use crate::services::whiteboard::WhiteboardStore;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum: all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub whiteboard_rooms: Arc<Registry>,
    pub chat_rooms: Arc<Registry>,
    pub tokens: TokenVerifier,
    pub members: Arc<dyn MembershipStore>,
    pub chat: Arc<dyn ChatStore>,
    pub whiteboards: Arc<dyn WhiteboardStore>,
    /// Deadline for a single chat message insert.
    pub chat_persist_timeout: Duration,
}

impl AppState {
    #[must_use]
    pub fn new<S>(store: Arc<S>, tokens: TokenVerifier, chat_persist_timeout: Duration) -> Self
    where
        S: MembershipStore + ChatStore + WhiteboardStore + 'static,
    {
        Self {
            whiteboard_rooms: Arc::new(Registry::new("whiteboard")),
            chat_rooms: Arc::new(Registry::new("chat")),
            tokens,
            members: store.clone(),
            chat: store.clone(),
            whiteboards: store,
            chat_persist_timeout,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
