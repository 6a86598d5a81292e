//! Shared application state for the observer server.
//!
//! [`AppState`] holds the two broadcast hubs every client session
//! subscribes to, plus the shutdown signal sessions watch. The hubs are
//! constructed by the binary's composition root and shared with the
//! scheduler loops that publish into them.

use std::sync::Arc;

use tasklog_core::{Hub, PingHub, Shutdown, SnapshotHub};

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Hub carrying computed snapshots.
    pub snapshots: SnapshotHub,
    /// Hub carrying heartbeats.
    pub pings: PingHub,
    /// Fires when the process is stopping.
    pub shutdown: Arc<Shutdown>,
}

impl AppState {
    /// Build state around existing hubs.
    pub const fn new(snapshots: SnapshotHub, pings: PingHub, shutdown: Arc<Shutdown>) -> Self {
        Self {
            snapshots,
            pings,
            shutdown,
        }
    }

    /// Build state with fresh hubs of the given per-subscriber capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(
            Hub::new("snapshots", capacity),
            Hub::new("pings", capacity),
            Arc::new(Shutdown::new()),
        )
    }
}
