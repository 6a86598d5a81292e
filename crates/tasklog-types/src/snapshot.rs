//! The operational snapshot: task and courier counts per city.
//!
//! A [`Snapshot`] is computed once per snapshot period, appended to the
//! history store, and streamed to every connected observer. Its JSON shape
//! is the storage shape:
//!
//! ```json
//! {
//!   "date": "2026-10-19T12:00:00Z",
//!   "cities": [
//!     {
//!       "city_id": 1,
//!       "tasks": { "waiting": 2, "assigned": 1, "in_progress": 0 },
//!       "couriers": { "working": 0, "connected_free": 0, "connected_working": 0 }
//!     }
//!   ]
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::CityId;

/// Task status codes counted by the snapshot.
///
/// Only these three statuses are "active"; any other status code in the
/// operational store is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created and waiting for a courier.
    Waiting,
    /// A courier has been assigned but has not started.
    Assigned,
    /// The courier is carrying out the task.
    InProgress,
}

impl TaskStatus {
    /// All active statuses, in status-code order.
    pub const ACTIVE: [Self; 3] = [Self::Waiting, Self::Assigned, Self::InProgress];

    /// The status code stored in the operational store.
    pub const fn code(self) -> i32 {
        match self {
            Self::Waiting => 2,
            Self::Assigned => 3,
            Self::InProgress => 4,
        }
    }

    /// Map a stored status code back to an active status.
    ///
    /// Returns `None` for codes outside the active set.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            2 => Some(Self::Waiting),
            3 => Some(Self::Assigned),
            4 => Some(Self::InProgress),
            _ => None,
        }
    }
}

/// Active task counts for one city.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TaskCounts {
    /// Tasks with status [`TaskStatus::Waiting`].
    pub waiting: u32,
    /// Tasks with status [`TaskStatus::Assigned`].
    pub assigned: u32,
    /// Tasks with status [`TaskStatus::InProgress`].
    pub in_progress: u32,
}

impl TaskCounts {
    /// Return the count stored for `status`.
    pub const fn get(&self, status: TaskStatus) -> u32 {
        match status {
            TaskStatus::Waiting => self.waiting,
            TaskStatus::Assigned => self.assigned,
            TaskStatus::InProgress => self.in_progress,
        }
    }

    /// Add `count` to the field routed by `status`.
    pub const fn add(&mut self, status: TaskStatus, count: u32) {
        let field = match status {
            TaskStatus::Waiting => &mut self.waiting,
            TaskStatus::Assigned => &mut self.assigned,
            TaskStatus::InProgress => &mut self.in_progress,
        };
        *field = field.saturating_add(count);
    }
}

/// Courier counts for one city.
///
/// `working` comes from live assignments in the operational store, while
/// `connected_free` and `connected_working` come from the most recent
/// connectivity sample in the history store. The two sources have different
/// recency and are never reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CourierCounts {
    /// Couriers with at least one active assignment.
    pub working: u32,
    /// Sampled couriers with no active task.
    pub connected_free: u32,
    /// Sampled couriers with one or more active tasks.
    pub connected_working: u32,
}

/// Statistics for a single city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CityStats {
    /// The city these counts belong to.
    pub city_id: CityId,
    /// Active task counts.
    pub tasks: TaskCounts,
    /// Courier counts.
    pub couriers: CourierCounts,
}

impl CityStats {
    /// A record for `city_id` with every count at zero.
    pub fn new(city_id: CityId) -> Self {
        Self {
            city_id,
            tasks: TaskCounts::default(),
            couriers: CourierCounts::default(),
        }
    }
}

/// One computed, timestamped set of per-city statistics.
///
/// Immutable once built. City order carries no meaning; there is at most
/// one [`CityStats`] per [`CityId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Snapshot {
    /// When the snapshot was computed.
    pub date: DateTime<Utc>,
    /// Per-city statistics.
    pub cities: Vec<CityStats>,
}

impl Snapshot {
    /// Look up the statistics for `city_id`.
    pub fn city(&self, city_id: CityId) -> Option<&CityStats> {
        self.cities.iter().find(|c| c.city_id == city_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for status in TaskStatus::ACTIVE {
            assert_eq!(TaskStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(TaskStatus::from_code(1), None);
        assert_eq!(TaskStatus::from_code(5), None);
    }

    #[test]
    fn task_counts_route_by_status() {
        let mut counts = TaskCounts::default();
        counts.add(TaskStatus::Waiting, 2);
        counts.add(TaskStatus::InProgress, 1);
        counts.add(TaskStatus::Waiting, 1);
        assert_eq!(counts.get(TaskStatus::Waiting), 3);
        assert_eq!(counts.get(TaskStatus::Assigned), 0);
        assert_eq!(counts.get(TaskStatus::InProgress), 1);
    }

    #[test]
    fn task_counts_saturate() {
        let mut counts = TaskCounts {
            waiting: u32::MAX,
            ..TaskCounts::default()
        };
        counts.add(TaskStatus::Waiting, 10);
        assert_eq!(counts.waiting, u32::MAX);
    }

    #[test]
    fn snapshot_serializes_storage_shape() {
        let snapshot = Snapshot {
            date: DateTime::parse_from_rfc3339("2026-10-19T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            cities: vec![CityStats {
                city_id: CityId::new(1),
                tasks: TaskCounts {
                    waiting: 2,
                    assigned: 1,
                    in_progress: 0,
                },
                couriers: CourierCounts::default(),
            }],
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["date"], "2026-10-19T12:00:00Z");
        assert_eq!(value["cities"][0]["city_id"], 1);
        assert_eq!(value["cities"][0]["tasks"]["in_progress"], 0);
        assert_eq!(value["cities"][0]["couriers"]["connected_free"], 0);

        let back: Snapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn city_lookup() {
        let snapshot = Snapshot {
            date: Utc::now(),
            cities: vec![CityStats::new(CityId::new(4))],
        };
        assert!(snapshot.city(CityId::new(4)).is_some());
        assert!(snapshot.city(CityId::new(5)).is_none());
    }
}
