//! Read-only count queries against the operational database.
//!
//! The operational schema is owned by the dispatch system. The feed relies
//! on two tables:
//!
//! - `tasks (id, city_id BIGINT, status_id INTEGER, ...)`
//! - `couriers (id, city_id BIGINT, active_tasks INTEGER, active_orders INTEGER, ...)`
//!
//! A courier is working when it holds at least one assignment of either
//! kind (`active_tasks + active_orders > 0`).

use sqlx::PgPool;

use crate::error::DbError;

/// Count queries on the `tasks` table.
pub struct TaskStore<'a> {
    pool: &'a PgPool,
}

impl<'a> TaskStore<'a> {
    /// Create a new task store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Count tasks grouped by `(city_id, status_id)`, restricted to the
    /// given status codes.
    ///
    /// Groups with no rows are simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn count_by_city_and_status(
        &self,
        status_codes: &[i32],
    ) -> Result<Vec<TaskCountRow>, DbError> {
        if status_codes.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, TaskCountRow>(
            r"SELECT city_id, status_id, COUNT(*) AS count
              FROM tasks
              WHERE status_id = ANY($1)
              GROUP BY city_id, status_id",
        )
        .bind(status_codes)
        .fetch_all(self.pool)
        .await?;

        tracing::debug!(groups = rows.len(), "Counted tasks by city and status");
        Ok(rows)
    }
}

/// Count queries on the `couriers` table.
pub struct CourierStore<'a> {
    pool: &'a PgPool,
}

impl<'a> CourierStore<'a> {
    /// Create a new courier store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Count couriers holding at least one active assignment, grouped by
    /// `city_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn count_working_by_city(&self) -> Result<Vec<CourierCountRow>, DbError> {
        let rows = sqlx::query_as::<_, CourierCountRow>(
            r"SELECT city_id, COUNT(*) AS count
              FROM couriers
              WHERE COALESCE(active_tasks, 0) + COALESCE(active_orders, 0) > 0
              GROUP BY city_id",
        )
        .fetch_all(self.pool)
        .await?;

        tracing::debug!(groups = rows.len(), "Counted working couriers by city");
        Ok(rows)
    }
}

/// One `(city, status)` group from [`TaskStore::count_by_city_and_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct TaskCountRow {
    /// The city the tasks belong to.
    pub city_id: i64,
    /// The stored status code.
    pub status_id: i32,
    /// Number of tasks in the group.
    pub count: i64,
}

/// One city group from [`CourierStore::count_working_by_city`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct CourierCountRow {
    /// The city the couriers operate in.
    pub city_id: i64,
    /// Number of working couriers.
    pub count: i64,
}
