//! threadcast-server - HTTP front end for thread posting
//!
//! Exposes `POST /send-tweet` behind HTTP Basic auth. The binary in
//! `main.rs` wires configuration, logging and shutdown around [`app::router`].

pub mod app;
pub mod auth;
pub mod body;
pub mod bootstrap;

pub use app::{router, ApiError, AppState};
pub use bootstrap::prepare_state;
