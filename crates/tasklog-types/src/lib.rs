//! Shared type definitions for the Tasklog live feed.
//!
//! This crate is the single source of truth for the snapshot shape that is
//! persisted to the history store and streamed to observers. Types defined
//! here flow downstream to `TypeScript` via `ts-rs` for dashboard clients.
//!
//! # Modules
//!
//! - [`ids`] -- Integer identifier wrappers for cities and couriers
//! - [`snapshot`] -- The per-city statistics snapshot and its counters
//! - [`connectivity`] -- Courier connectivity samples read from history
//! - [`message`] -- Outbound frames sent to connected observers

pub mod connectivity;
pub mod ids;
pub mod message;
pub mod snapshot;

// Re-export all public types at crate root for convenience.
pub use connectivity::{ConnectivitySample, CourierConnection};
pub use ids::{CityId, CourierId};
pub use message::ClientMessage;
pub use snapshot::{CityStats, CourierCounts, Snapshot, TaskCounts, TaskStatus};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // The files are written to the `bindings/` directory relative to
        // the crate root.
        use ts_rs::TS;

        let _ = crate::ids::CityId::export_all();
        let _ = crate::ids::CourierId::export_all();
        let _ = crate::snapshot::Snapshot::export_all();
        let _ = crate::snapshot::CityStats::export_all();
        let _ = crate::snapshot::TaskCounts::export_all();
        let _ = crate::snapshot::CourierCounts::export_all();
        let _ = crate::connectivity::ConnectivitySample::export_all();
        let _ = crate::connectivity::CourierConnection::export_all();
    }
}
