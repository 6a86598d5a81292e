//! In-memory data source.
//!
//! [`MemorySource`] implements both [`OperationalSource`] and
//! [`HistorySource`] over plain records held in memory. It answers the
//! grouped-count queries the same way the database does, which lets the
//! whole snapshot pipeline run without `PostgreSQL`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tasklog_types::{CityId, ConnectivitySample, Snapshot, TaskStatus};

use crate::source::{CourierGroup, HistorySource, OperationalSource, SourceError, TaskGroup};

/// A task row in the operational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRecord {
    /// The city the task belongs to.
    pub city_id: CityId,
    /// Stored status code.
    pub status_code: i32,
}

/// A courier row in the operational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourierRecord {
    /// The city the courier operates in.
    pub city_id: CityId,
    /// Active task assignments.
    pub active_tasks: u32,
    /// Active order assignments.
    pub active_orders: u32,
}

impl CourierRecord {
    const fn is_working(&self) -> bool {
        self.active_tasks > 0 || self.active_orders > 0
    }
}

#[derive(Debug, Default)]
struct Records {
    tasks: Vec<TaskRecord>,
    couriers: Vec<CourierRecord>,
    samples: Vec<ConnectivitySample>,
    snapshots: Vec<Snapshot>,
}

/// Operational and history store backed by in-memory records.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: Mutex<Records>,
    fail_operational: AtomicBool,
    fail_history_reads: AtomicBool,
    fail_history_writes: AtomicBool,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a task with the given city and status code.
    pub fn add_task(&self, city_id: i64, status_code: i32) {
        self.records().tasks.push(TaskRecord {
            city_id: CityId::new(city_id),
            status_code,
        });
    }

    /// Add a courier with the given assignment counts.
    pub fn add_courier(&self, city_id: i64, active_tasks: u32, active_orders: u32) {
        self.records().couriers.push(CourierRecord {
            city_id: CityId::new(city_id),
            active_tasks,
            active_orders,
        });
    }

    /// Record a connectivity sample in the history store.
    pub fn add_connectivity_sample(&self, sample: ConnectivitySample) {
        self.records().samples.push(sample);
    }

    /// Snapshots appended so far, oldest first.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.records().snapshots.clone()
    }

    /// Make every operational query fail.
    pub fn set_fail_operational(&self, fail: bool) {
        self.fail_operational.store(fail, Ordering::Release);
    }

    /// Make history reads fail.
    pub fn set_fail_history_reads(&self, fail: bool) {
        self.fail_history_reads.store(fail, Ordering::Release);
    }

    /// Make history appends fail.
    pub fn set_fail_history_writes(&self, fail: bool) {
        self.fail_history_writes.store(fail, Ordering::Release);
    }

    fn check_operational(&self) -> Result<(), SourceError> {
        if self.fail_operational.load(Ordering::Acquire) {
            return Err(SourceError::Operational {
                message: String::from("operational store unavailable"),
            });
        }
        Ok(())
    }
}

impl OperationalSource for MemorySource {
    async fn task_counts(&self, statuses: &[TaskStatus]) -> Result<Vec<TaskGroup>, SourceError> {
        self.check_operational()?;

        let codes: Vec<i32> = statuses.iter().map(|s| s.code()).collect();
        let mut groups: BTreeMap<(CityId, i32), u32> = BTreeMap::new();
        for task in self
            .records()
            .tasks
            .iter()
            .filter(|t| codes.contains(&t.status_code))
        {
            let count = groups.entry((task.city_id, task.status_code)).or_insert(0);
            *count = count.saturating_add(1);
        }

        Ok(groups
            .into_iter()
            .map(|((city_id, status_code), count)| TaskGroup {
                city_id,
                status_code,
                count,
            })
            .collect())
    }

    async fn working_courier_counts(&self) -> Result<Vec<CourierGroup>, SourceError> {
        self.check_operational()?;

        let mut groups: BTreeMap<CityId, u32> = BTreeMap::new();
        for courier in self.records().couriers.iter().filter(|c| c.is_working()) {
            let count = groups.entry(courier.city_id).or_insert(0);
            *count = count.saturating_add(1);
        }

        Ok(groups
            .into_iter()
            .map(|(city_id, count)| CourierGroup { city_id, count })
            .collect())
    }
}

impl HistorySource for MemorySource {
    async fn latest_connectivity(&self) -> Result<Option<ConnectivitySample>, SourceError> {
        if self.fail_history_reads.load(Ordering::Acquire) {
            return Err(SourceError::History {
                message: String::from("history store unavailable"),
            });
        }
        Ok(self.records().samples.iter().max_by_key(|s| s.date).cloned())
    }

    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<(), SourceError> {
        if self.fail_history_writes.load(Ordering::Acquire) {
            return Err(SourceError::History {
                message: String::from("history insert rejected"),
            });
        }
        self.records().snapshots.push(snapshot.clone());
        Ok(())
    }
}
