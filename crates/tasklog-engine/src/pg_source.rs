//! `PostgreSQL`-backed implementations of the pipeline's data sources.
//!
//! [`PgOperationalSource`] answers count queries against the dispatch
//! database; [`PgHistorySource`] reads connectivity samples from and
//! appends snapshots to the history database. Both map [`DbError`] into
//! the pipeline's [`SourceError`] so the scheduler never sees driver types.

use sqlx::PgPool;
use tasklog_core::{CourierGroup, HistorySource, OperationalSource, SourceError, TaskGroup};
use tasklog_db::{COURIER_CONNECTIONS, CourierStore, DbError, HistoryStore, TASK_LOGS, TaskStore};
use tasklog_types::{CityId, ConnectivitySample, Snapshot, TaskStatus};

/// Clamp a database `COUNT(*)` into the feed's counter type.
fn clamp_count(count: i64) -> u32 {
    u32::try_from(count.max(0)).unwrap_or(u32::MAX)
}

fn operational_error(e: &DbError) -> SourceError {
    SourceError::Operational {
        message: e.to_string(),
    }
}

fn history_error(e: &DbError) -> SourceError {
    SourceError::History {
        message: e.to_string(),
    }
}

/// Live counts from the dispatch database.
#[derive(Debug, Clone)]
pub struct PgOperationalSource {
    pool: PgPool,
}

impl PgOperationalSource {
    /// Wrap a pool connected to the operational database.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl OperationalSource for PgOperationalSource {
    async fn task_counts(&self, statuses: &[TaskStatus]) -> Result<Vec<TaskGroup>, SourceError> {
        let codes: Vec<i32> = statuses.iter().map(|s| s.code()).collect();
        let rows = TaskStore::new(&self.pool)
            .count_by_city_and_status(&codes)
            .await
            .map_err(|e| operational_error(&e))?;

        Ok(rows
            .into_iter()
            .map(|row| TaskGroup {
                city_id: CityId::new(row.city_id),
                status_code: row.status_id,
                count: clamp_count(row.count),
            })
            .collect())
    }

    async fn working_courier_counts(&self) -> Result<Vec<CourierGroup>, SourceError> {
        let rows = CourierStore::new(&self.pool)
            .count_working_by_city()
            .await
            .map_err(|e| operational_error(&e))?;

        Ok(rows
            .into_iter()
            .map(|row| CourierGroup {
                city_id: CityId::new(row.city_id),
                count: clamp_count(row.count),
            })
            .collect())
    }
}

/// Connectivity samples and snapshot history.
#[derive(Debug, Clone)]
pub struct PgHistorySource {
    pool: PgPool,
}

impl PgHistorySource {
    /// Wrap a pool connected to the history database.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl HistorySource for PgHistorySource {
    async fn latest_connectivity(&self) -> Result<Option<ConnectivitySample>, SourceError> {
        HistoryStore::new(&self.pool)
            .latest_as::<ConnectivitySample>(COURIER_CONNECTIONS)
            .await
            .map_err(|e| history_error(&e))
    }

    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<(), SourceError> {
        let id = HistoryStore::new(&self.pool)
            .insert(TASK_LOGS, snapshot.date, snapshot)
            .await
            .map_err(|e| history_error(&e))?;
        tracing::debug!(id, cities = snapshot.cities.len(), "Snapshot appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_clamp_into_u32() {
        assert_eq!(clamp_count(0), 0);
        assert_eq!(clamp_count(42), 42);
        assert_eq!(clamp_count(-3), 0);
        assert_eq!(clamp_count(i64::from(u32::MAX) + 1), u32::MAX);
    }

    #[test]
    fn db_errors_keep_their_side() {
        let e = DbError::Config("bad".to_owned());
        assert!(matches!(operational_error(&e), SourceError::Operational { .. }));
        assert!(matches!(history_error(&e), SourceError::History { .. }));
    }
}
