//! Remote durable tier. Stores only scalar totals per (user, date); the
//! hourly histogram never leaves the device.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::StepSyncResult,
    models::{StepRecord, StepSource},
};

pub mod memory;

pub use memory::InMemoryRemoteStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStepFields {
    pub steps: u64,
    pub goal: u64,
    pub calories: u64,
    pub distance: f64,
    pub active_minutes: u64,
    pub source: StepSource,
    pub last_updated: DateTime<Utc>,
}

impl From<&StepRecord> for RemoteStepFields {
    fn from(record: &StepRecord) -> Self {
        Self {
            steps: record.steps,
            goal: record.goal,
            calories: record.calories,
            distance: record.distance,
            active_minutes: record.active_minutes,
            source: record.source,
            last_updated: record.last_updated,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStepRow {
    pub user_id: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub fields: RemoteStepFields,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert or replace the row keyed by `(user_id, date)`.
    async fn upsert(
        &self,
        user_id: &str,
        date: NaiveDate,
        fields: RemoteStepFields,
    ) -> StepSyncResult<()>;

    /// Rows for `user_id` with `start <= date <= end`, ordered by date.
    async fn range_query(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StepSyncResult<Vec<RemoteStepRow>>;
}
