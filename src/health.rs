//! Health-app sync capability. The platform adapter reports how many steps
//! the health app has seen since the last sync; the façade merges that delta
//! into today's record as `StepSource::HealthApp`.

use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;

use crate::error::{StepSyncError, StepSyncResult};

#[async_trait]
pub trait HealthSource: Send + Sync {
    async fn fetch_step_delta(&self) -> StepSyncResult<u64>;
}

/// Hands out queued results in order, then zero deltas once drained.
#[derive(Default)]
pub struct StaticHealthSource {
    queued: Mutex<VecDeque<StepSyncResult<u64>>>,
}

impl StaticHealthSource {
    pub fn new(deltas: impl IntoIterator<Item = u64>) -> Self {
        Self {
            queued: Mutex::new(deltas.into_iter().map(Ok).collect()),
        }
    }

    pub fn push_delta(&self, delta: u64) {
        self.with_queue(|queue| queue.push_back(Ok(delta)));
    }

    pub fn push_failure(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.with_queue(|queue| queue.push_back(Err(StepSyncError::HealthSync(reason))));
    }

    fn with_queue<T>(&self, f: impl FnOnce(&mut VecDeque<StepSyncResult<u64>>) -> T) -> T {
        let mut guard = match self.queued.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl HealthSource for StaticHealthSource {
    async fn fetch_step_delta(&self) -> StepSyncResult<u64> {
        self.with_queue(|queue| queue.pop_front()).unwrap_or(Ok(0))
    }
}
