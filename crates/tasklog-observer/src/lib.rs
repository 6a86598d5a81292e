//! Observer feed server for the Tasklog live feed.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/task_log`) streaming snapshot updates and
//!   keepalive pings to each connected observer
//! - **Health endpoint** (`/health`) reporting live subscriber counts
//!
//! # Architecture
//!
//! Every accepted `WebSocket` runs one client session (see [`session`]).
//! The session registers on the snapshot hub and the ping hub held in
//! [`AppState`], multiplexes both into the client's outbound frames, and
//! releases both registrations together when the client goes away, a
//! send fails, or the process shuts down.

pub mod handlers;
pub mod router;
pub mod server;
pub mod session;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{DEFAULT_PORT, ServerConfig, ServerError};
pub use session::{ChannelError, ClientChannel, Inbound, SessionEnd, SessionSummary, run_session};
pub use startup::{StartupError, spawn_observer};
pub use state::AppState;
