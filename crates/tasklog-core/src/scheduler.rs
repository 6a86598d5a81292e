//! Periodic snapshot and heartbeat loops.
//!
//! Two independent timers drive the feed:
//!
//! - **Snapshot cycle** (nominally every 60 s): compute a snapshot, append
//!   it to the history store, and publish it to the snapshot hub only if
//!   the append succeeded. A failed cycle is logged and skipped; the loop
//!   keeps ticking.
//! - **Heartbeat** (nominally every 15 s): publish a [`Heartbeat`] marker to
//!   the ping hub, regardless of how the snapshot cycle is doing.
//!
//! Each loop body runs to completion before the next tick is awaited, so a
//! cycle never overlaps itself. Both loops stop at the next tick boundary
//! once the [`Shutdown`] signal fires.

use std::sync::Arc;
use std::time::Duration;

use tasklog_types::Snapshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::aggregator::SnapshotAggregator;
use crate::hub::Hub;
use crate::shutdown::Shutdown;
use crate::sink::SnapshotSink;
use crate::source::{HistorySource, OperationalSource, SourceError};

/// Nominal snapshot period.
pub const DEFAULT_SNAPSHOT_PERIOD: Duration = Duration::from_mins(1);

/// Nominal heartbeat period.
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(15);

/// Longest accepted timer period. Longer periods are clamped to it.
pub const MAX_PERIOD: Duration = Duration::from_hours(24);

/// The constant "alive" marker published on the ping hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat;

/// Hub carrying snapshots. Values are shared, not deep-copied per subscriber.
pub type SnapshotHub = Hub<Arc<Snapshot>>;

/// Hub carrying heartbeats.
pub type PingHub = Hub<Heartbeat>;

/// Why a snapshot cycle produced nothing.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// Building the snapshot failed.
    #[error("snapshot aggregation failed: {0}")]
    Aggregate(#[source] SourceError),

    /// Appending the snapshot to the history store failed.
    #[error("snapshot persist failed: {0}")]
    Persist(#[source] SourceError),
}

/// What a successful cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Number of cities in the published snapshot.
    pub cities: usize,
    /// Number of subscribers the snapshot was queued for.
    pub receivers: usize,
}

/// The compute, persist, publish pipeline.
pub struct SnapshotCycle<O, H> {
    aggregator: SnapshotAggregator<O, H>,
    sink: SnapshotSink<H>,
    hub: SnapshotHub,
}

impl<O: OperationalSource, H: HistorySource> SnapshotCycle<O, H> {
    /// Wire a cycle over the two sources, publishing into `hub`.
    pub fn new(operational: Arc<O>, history: Arc<H>, hub: SnapshotHub) -> Self {
        Self {
            aggregator: SnapshotAggregator::new(operational, Arc::clone(&history)),
            sink: SnapshotSink::new(history),
            hub,
        }
    }

    /// Run one cycle: compute, persist, then publish.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Aggregate`] when the snapshot cannot be built
    /// and [`CycleError::Persist`] when it cannot be stored. In both cases
    /// nothing is published.
    pub async fn run_once(&self) -> Result<CycleReport, CycleError> {
        let snapshot = self
            .aggregator
            .compute_snapshot()
            .await
            .map_err(CycleError::Aggregate)?;

        self.sink
            .persist(&snapshot)
            .await
            .map_err(CycleError::Persist)?;

        let cities = snapshot.cities.len();
        let receivers = self.hub.publish(Arc::new(snapshot));

        Ok(CycleReport { cities, receivers })
    }
}

/// A ticker that first fires one full `period` from now.
///
/// `period` is clamped to [`MAX_PERIOD`] so the deadline cannot overflow.
fn ticker(period: Duration) -> tokio::time::Interval {
    let period = period.min(MAX_PERIOD);
    let now = Instant::now();
    let start = now.checked_add(period).unwrap_or(now);
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Run the snapshot cycle every `period` until `shutdown` fires.
///
/// Returns the number of ticks handled, successful or not.
pub async fn run_snapshot_loop<O, H>(
    cycle: SnapshotCycle<O, H>,
    period: Duration,
    shutdown: Arc<Shutdown>,
) -> u64
where
    O: OperationalSource,
    H: HistorySource,
{
    let mut ticker = ticker(period);
    let mut ticks: u64 = 0;

    info!(period_secs = period.as_secs(), "Snapshot loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = shutdown.wait() => break,
        }
        ticks = ticks.saturating_add(1);

        match cycle.run_once().await {
            Ok(report) => info!(
                tick = ticks,
                cities = report.cities,
                receivers = report.receivers,
                "Snapshot published"
            ),
            Err(e @ CycleError::Aggregate(_)) => {
                warn!(tick = ticks, error = %e, "Snapshot cycle skipped");
            }
            Err(e @ CycleError::Persist(_)) => {
                error!(tick = ticks, error = %e, "Snapshot discarded, not published");
            }
        }
    }

    info!(ticks, "Snapshot loop stopped");
    ticks
}

/// Publish a [`Heartbeat`] every `period` until `shutdown` fires.
///
/// Returns the number of heartbeats published.
pub async fn run_heartbeat_loop(hub: PingHub, period: Duration, shutdown: Arc<Shutdown>) -> u64 {
    let mut ticker = ticker(period);
    let mut beats: u64 = 0;

    info!(period_secs = period.as_secs(), "Heartbeat loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = shutdown.wait() => break,
        }
        let receivers = hub.publish(Heartbeat);
        beats = beats.saturating_add(1);
        debug!(beat = beats, receivers, "Heartbeat published");
    }

    info!(beats, "Heartbeat loop stopped");
    beats
}
