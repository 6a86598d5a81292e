//! Data-source traits the snapshot pipeline depends on.
//!
//! The pipeline never talks to a database driver directly. It asks an
//! [`OperationalSource`] for live counts and a [`HistorySource`] for the
//! latest connectivity sample and for somewhere to append finished
//! snapshots. The engine binary provides `PostgreSQL` implementations;
//! tests provide in-memory ones.

use std::future::Future;

use tasklog_types::{CityId, ConnectivitySample, Snapshot, TaskStatus};

/// Errors raised by a data source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The operational store query failed.
    #[error("operational store error: {message}")]
    Operational {
        /// Description of the failure.
        message: String,
    },

    /// The history store query or insert failed.
    #[error("history store error: {message}")]
    History {
        /// Description of the failure.
        message: String,
    },
}

/// Number of tasks in one `(city, status code)` group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskGroup {
    /// The city the tasks belong to.
    pub city_id: CityId,
    /// The stored status code (see [`TaskStatus::code`]).
    pub status_code: i32,
    /// Number of tasks in the group.
    pub count: u32,
}

/// Number of working couriers in one city.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourierGroup {
    /// The city the couriers operate in.
    pub city_id: CityId,
    /// Couriers with at least one active assignment.
    pub count: u32,
}

/// Live task and courier state.
pub trait OperationalSource: Send + Sync {
    /// Count tasks grouped by city and status, restricted to `statuses`.
    fn task_counts(
        &self,
        statuses: &[TaskStatus],
    ) -> impl Future<Output = Result<Vec<TaskGroup>, SourceError>> + Send;

    /// Count couriers with a nonzero active-assignment count, grouped by
    /// city.
    fn working_courier_counts(
        &self,
    ) -> impl Future<Output = Result<Vec<CourierGroup>, SourceError>> + Send;
}

/// Append-only history of snapshots and connectivity samples.
pub trait HistorySource: Send + Sync {
    /// Fetch the most recently dated connectivity sample, if any exists.
    fn latest_connectivity(
        &self,
    ) -> impl Future<Output = Result<Option<ConnectivitySample>, SourceError>> + Send;

    /// Append a finished snapshot.
    fn append_snapshot(
        &self,
        snapshot: &Snapshot,
    ) -> impl Future<Output = Result<(), SourceError>> + Send;
}
