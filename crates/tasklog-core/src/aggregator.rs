//! Snapshot aggregation.
//!
//! Builds one [`Snapshot`] from three independent queries:
//!
//! 1. Tasks grouped by city and status (operational store). Each group's
//!    count is routed into the matching [`TaskCounts`](tasklog_types::TaskCounts)
//!    field.
//! 2. Working couriers grouped by city (operational store), routed into
//!    `couriers.working`.
//! 3. The newest connectivity sample (history store). Each sampled courier
//!    adds one to `connected_working` when its task count is nonzero and to
//!    `connected_free` otherwise.
//!
//! A city record is created, zeroed, the first time any pass mentions the
//! city, and reused by every later pass. Cities no pass mentions with a
//! nonzero count are absent from the result.
//!
//! The working count and the connectivity counts come from sources of
//! different recency and are kept side by side without reconciliation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tasklog_types::{CityId, CityStats, ConnectivitySample, Snapshot, TaskStatus};
use tracing::debug;

use crate::source::{CourierGroup, HistorySource, OperationalSource, SourceError, TaskGroup};

/// Per-city records for one snapshot under construction.
///
/// Private to a single [`SnapshotAggregator::compute_snapshot`] call.
#[derive(Debug, Default)]
pub struct CityTable {
    cities: BTreeMap<CityId, CityStats>,
}

impl CityTable {
    /// Find the record for `city_id`, creating a zeroed one if needed.
    fn entry(&mut self, city_id: CityId) -> &mut CityStats {
        self.cities
            .entry(city_id)
            .or_insert_with(|| CityStats::new(city_id))
    }

    /// Route task group counts into each city's task counters.
    ///
    /// Groups with an inactive status code or a zero count are skipped.
    pub fn add_task_groups(&mut self, groups: &[TaskGroup]) {
        for group in groups {
            let Some(status) = TaskStatus::from_code(group.status_code) else {
                debug!(
                    city_id = %group.city_id,
                    status_code = group.status_code,
                    "Ignoring task group with inactive status"
                );
                continue;
            };
            if group.count == 0 {
                continue;
            }
            self.entry(group.city_id).tasks.add(status, group.count);
        }
    }

    /// Route working-courier counts into each city's `working` counter.
    pub fn add_working_couriers(&mut self, groups: &[CourierGroup]) {
        for group in groups.iter().filter(|g| g.count > 0) {
            let couriers = &mut self.entry(group.city_id).couriers;
            couriers.working = couriers.working.saturating_add(group.count);
        }
    }

    /// Partition the sampled couriers into free and working per city.
    pub fn add_connectivity(&mut self, sample: &ConnectivitySample) {
        for connection in &sample.couriers {
            let couriers = &mut self.entry(connection.city_id).couriers;
            if connection.is_working() {
                couriers.connected_working = couriers.connected_working.saturating_add(1);
            } else {
                couriers.connected_free = couriers.connected_free.saturating_add(1);
            }
        }
    }

    /// Number of cities recorded so far.
    pub fn len(&self) -> usize {
        self.cities.len()
    }

    /// Whether no city has been recorded.
    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    /// Finish the table into a snapshot stamped with `date`.
    pub fn into_snapshot(self, date: DateTime<Utc>) -> Snapshot {
        Snapshot {
            date,
            cities: self.cities.into_values().collect(),
        }
    }
}

/// Computes snapshots from an operational and a history source.
pub struct SnapshotAggregator<O, H> {
    operational: Arc<O>,
    history: Arc<H>,
}

impl<O, H> Clone for SnapshotAggregator<O, H> {
    fn clone(&self) -> Self {
        Self {
            operational: Arc::clone(&self.operational),
            history: Arc::clone(&self.history),
        }
    }
}

impl<O: OperationalSource, H: HistorySource> SnapshotAggregator<O, H> {
    /// Create an aggregator over the two sources.
    pub const fn new(operational: Arc<O>, history: Arc<H>) -> Self {
        Self {
            operational,
            history,
        }
    }

    /// Build a snapshot of the current state.
    ///
    /// The three queries run concurrently. If any of them fails the whole
    /// computation fails; no partial snapshot is returned.
    ///
    /// # Errors
    ///
    /// Returns the first [`SourceError`] raised by either source.
    pub async fn compute_snapshot(&self) -> Result<Snapshot, SourceError> {
        let (tasks, couriers, sample) = tokio::try_join!(
            self.operational.task_counts(&TaskStatus::ACTIVE),
            self.operational.working_courier_counts(),
            self.history.latest_connectivity(),
        )?;

        let mut table = CityTable::default();
        table.add_task_groups(&tasks);
        table.add_working_couriers(&couriers);
        if let Some(sample) = &sample {
            table.add_connectivity(sample);
        } else {
            debug!("No connectivity sample recorded yet");
        }

        debug!(
            task_groups = tasks.len(),
            courier_groups = couriers.len(),
            sampled_couriers = sample.as_ref().map_or(0, |s| s.couriers.len()),
            cities = table.len(),
            "Snapshot aggregated"
        );

        Ok(table.into_snapshot(Utc::now()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use tasklog_types::{CourierConnection, CourierCounts, CourierId, TaskCounts};

    use super::*;

    fn task(city: i64, status: i32, count: u32) -> TaskGroup {
        TaskGroup {
            city_id: CityId::new(city),
            status_code: status,
            count,
        }
    }

    fn conn(courier: i64, city: i64, task_count: u32) -> CourierConnection {
        CourierConnection {
            courier_id: CourierId::new(courier),
            city_id: CityId::new(city),
            task_count,
        }
    }

    #[test]
    fn task_groups_route_to_status_fields() {
        let mut table = CityTable::default();
        table.add_task_groups(&[task(1, 2, 2), task(1, 3, 1), task(3, 4, 1)]);
        let snapshot = table.into_snapshot(Utc::now());

        assert_eq!(snapshot.cities.len(), 2);
        assert_eq!(
            snapshot.city(CityId::new(1)).unwrap().tasks,
            TaskCounts {
                waiting: 2,
                assigned: 1,
                in_progress: 0
            }
        );
        assert_eq!(
            snapshot.city(CityId::new(3)).unwrap().tasks,
            TaskCounts {
                waiting: 0,
                assigned: 0,
                in_progress: 1
            }
        );
    }

    #[test]
    fn inactive_and_empty_groups_create_no_city() {
        let mut table = CityTable::default();
        table.add_task_groups(&[task(5, 1, 10), task(6, 2, 0)]);
        table.add_working_couriers(&[CourierGroup {
            city_id: CityId::new(7),
            count: 0,
        }]);
        assert!(table.is_empty());
    }

    #[test]
    fn passes_share_one_record_per_city() {
        let mut table = CityTable::default();
        table.add_task_groups(&[task(1, 2, 1)]);
        table.add_working_couriers(&[CourierGroup {
            city_id: CityId::new(1),
            count: 4,
        }]);
        table.add_connectivity(&ConnectivitySample {
            date: Utc::now(),
            couriers: vec![conn(10, 1, 0), conn(11, 1, 2)],
        });

        let snapshot = table.into_snapshot(Utc::now());
        assert_eq!(snapshot.cities.len(), 1);
        assert_eq!(
            snapshot.cities[0].couriers,
            CourierCounts {
                working: 4,
                connected_free: 1,
                connected_working: 1
            }
        );
    }

    #[test]
    fn connectivity_only_city_gets_zero_task_counts() {
        let mut table = CityTable::default();
        table.add_connectivity(&ConnectivitySample {
            date: Utc::now(),
            couriers: vec![conn(1, 8, 0), conn(2, 8, 0), conn(3, 8, 3)],
        });

        let snapshot = table.into_snapshot(Utc::now());
        let city = snapshot.city(CityId::new(8)).unwrap();
        assert_eq!(city.tasks, TaskCounts::default());
        assert_eq!(city.couriers.working, 0);
        assert_eq!(city.couriers.connected_free, 2);
        assert_eq!(city.couriers.connected_working, 1);
    }
}
