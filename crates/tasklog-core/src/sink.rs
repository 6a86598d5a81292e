//! Snapshot persistence.
//!
//! Appends each finished snapshot to the history store. Insert only: no
//! update, no dedup, no retry. A failure is returned to the caller, which
//! skips that cycle's broadcast.

use std::sync::Arc;

use tasklog_types::Snapshot;

use crate::source::{HistorySource, SourceError};

/// Writes snapshots to the history store.
pub struct SnapshotSink<H> {
    history: Arc<H>,
}

impl<H> Clone for SnapshotSink<H> {
    fn clone(&self) -> Self {
        Self {
            history: Arc::clone(&self.history),
        }
    }
}

impl<H: HistorySource> SnapshotSink<H> {
    /// Create a sink writing to `history`.
    pub const fn new(history: Arc<H>) -> Self {
        Self { history }
    }

    /// Append `snapshot` to the history store.
    ///
    /// # Errors
    ///
    /// Returns the [`SourceError`] raised by the store. The snapshot itself
    /// is left untouched.
    pub async fn persist(&self, snapshot: &Snapshot) -> Result<(), SourceError> {
        self.history.append_snapshot(snapshot).await?;
        tracing::debug!(
            date = %snapshot.date,
            cities = snapshot.cities.len(),
            "Snapshot persisted"
        );
        Ok(())
    }
}
