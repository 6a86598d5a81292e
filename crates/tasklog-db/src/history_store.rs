//! Append-only history documents.
//!
//! The history database stores JSON documents in named collections. The
//! feed appends one document to [`TASK_LOGS`] per snapshot cycle and reads
//! the newest document of [`COURIER_CONNECTIONS`] when building a snapshot.
//! Documents are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::PgPool;

use crate::error::DbError;

/// Collection receiving computed snapshots.
pub const TASK_LOGS: &str = "task_logs";

/// Collection holding courier connectivity samples.
pub const COURIER_CONNECTIONS: &str = "courier_connections";

/// Operations on the `history_documents` table.
pub struct HistoryStore<'a> {
    pool: &'a PgPool,
}

impl<'a> HistoryStore<'a> {
    /// Create a new history store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Append one document to `collection`.
    ///
    /// Plain insert: no dedup, no upsert.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if the document cannot be encoded
    /// or [`DbError::Postgres`] if the insert fails.
    pub async fn insert<T: Serialize + Sync>(
        &self,
        collection: &str,
        recorded_at: DateTime<Utc>,
        document: &T,
    ) -> Result<i64, DbError> {
        let body = serde_json::to_value(document)?;

        let id: i64 = sqlx::query_scalar(
            r"INSERT INTO history_documents (collection, recorded_at, body)
              VALUES ($1, $2, $3)
              RETURNING id",
        )
        .bind(collection)
        .bind(recorded_at)
        .bind(&body)
        .fetch_one(self.pool)
        .await?;

        tracing::debug!(collection, id, "Inserted history document");
        Ok(id)
    }

    /// Fetch the most recently dated document of `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn latest(&self, collection: &str) -> Result<Option<HistoryDocumentRow>, DbError> {
        let row = sqlx::query_as::<_, HistoryDocumentRow>(
            r"SELECT id, collection, recorded_at, body
              FROM history_documents
              WHERE collection = $1
              ORDER BY recorded_at DESC, id DESC
              LIMIT 1",
        )
        .bind(collection)
        .fetch_optional(self.pool)
        .await?;

        Ok(row)
    }

    /// Fetch and decode the most recently dated document of `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails or
    /// [`DbError::Serialization`] if the body does not decode as `T`.
    pub async fn latest_as<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<Option<T>, DbError> {
        self.latest(collection)
            .await?
            .map(HistoryDocumentRow::decode)
            .transpose()
    }
}

/// A row from the `history_documents` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryDocumentRow {
    /// Auto-incremented document ID.
    pub id: i64,
    /// The collection the document belongs to.
    pub collection: String,
    /// The time the document describes.
    pub recorded_at: DateTime<Utc>,
    /// The document itself.
    pub body: serde_json::Value,
}

impl HistoryDocumentRow {
    /// Decode the document body as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if the body does not match `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, DbError> {
        Ok(serde_json::from_value(self.body)?)
    }
}
