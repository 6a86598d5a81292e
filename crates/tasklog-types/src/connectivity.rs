//! Courier connectivity samples.
//!
//! A connectivity sample is recorded periodically in the history store by an
//! external process. It lists every courier connected at that moment with
//! the number of tasks they were carrying.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{CityId, CourierId};

/// One connected courier inside a [`ConnectivitySample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CourierConnection {
    /// The connected courier.
    pub courier_id: CourierId,
    /// The city the courier operates in.
    pub city_id: CityId,
    /// Number of tasks the courier had active when sampled.
    pub task_count: u32,
}

impl CourierConnection {
    /// Whether the courier was carrying at least one task.
    pub const fn is_working(&self) -> bool {
        self.task_count > 0
    }
}

/// A dated list of connected couriers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ConnectivitySample {
    /// When the sample was taken.
    pub date: DateTime<Utc>,
    /// Couriers connected at that moment.
    #[serde(default)]
    pub couriers: Vec<CourierConnection>,
}
