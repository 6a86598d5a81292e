//! Data layer for the Tasklog live feed (`PostgreSQL`).
//!
//! Two databases are involved. The operational database holds the live
//! task and courier tables owned by the dispatch system; this crate only
//! reads from it. The history database holds an append-only document table
//! that receives every computed snapshot and the periodic courier
//! connectivity samples.
//!
//! # Architecture
//!
//! ```text
//! Snapshot cycle
//!     |
//!     +-- count queries -------> operational PostgreSQL
//!     |   |-- TaskStore        (tasks grouped by city and status)
//!     |   +-- CourierStore     (working couriers grouped by city)
//!     |
//!     +-- latest sample / append --> history PostgreSQL
//!         +-- HistoryStore     (append-only documents per collection)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`operational`] -- Read-only count queries against live tables
//! - [`history_store`] -- Append-only history documents
//! - [`error`] -- Shared error types

pub mod error;
pub mod history_store;
pub mod operational;
pub mod postgres;

// Re-export primary types for convenience.
pub use error::DbError;
pub use history_store::{HistoryDocumentRow, HistoryStore, COURIER_CONNECTIONS, TASK_LOGS};
pub use operational::{CourierCountRow, CourierStore, TaskCountRow, TaskStore};
pub use postgres::{PostgresConfig, PostgresPool};
