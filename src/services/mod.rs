//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and storage seams so route handlers
//! can stay focused on protocol translation and auth plumbing.

pub mod auth;
pub mod chat;
pub mod membership;
pub mod roles;
pub mod whiteboard;
