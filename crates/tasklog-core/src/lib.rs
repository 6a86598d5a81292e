//! Snapshot pipeline, broadcast hubs, and scheduling for the Tasklog live
//! feed.
//!
//! # Data flow
//!
//! ```text
//! snapshot timer --> SnapshotAggregator --> SnapshotSink --> snapshot Hub --+
//!                                                                           +--> client sessions
//! heartbeat timer ---------------------------------------> ping Hub -------+
//! ```
//!
//! # Modules
//!
//! - [`hub`] -- Generic publish-subscribe hub with per-subscriber queues
//! - [`source`] -- Traits for the operational and history stores
//! - [`aggregator`] -- Builds a [`Snapshot`](tasklog_types::Snapshot) from both stores
//! - [`sink`] -- Appends finished snapshots to the history store
//! - [`scheduler`] -- Snapshot and heartbeat timer loops
//! - [`shutdown`] -- Process-wide stop signal
//! - [`memory`] -- In-memory store implementing both source traits
//! - [`config`] -- YAML configuration

pub mod aggregator;
pub mod config;
pub mod hub;
pub mod memory;
pub mod scheduler;
pub mod shutdown;
pub mod sink;
pub mod source;

pub use aggregator::{CityTable, SnapshotAggregator};
pub use config::{ConfigError, TasklogConfig};
pub use hub::{Hub, Registration};
pub use memory::MemorySource;
pub use scheduler::{
    CycleError, CycleReport, Heartbeat, PingHub, SnapshotCycle, SnapshotHub, run_heartbeat_loop,
    run_snapshot_loop,
};
pub use shutdown::Shutdown;
pub use sink::SnapshotSink;
pub use source::{CourierGroup, HistorySource, OperationalSource, SourceError, TaskGroup};
