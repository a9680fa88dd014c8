use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex as StdMutex, MutexGuard,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::error::{StepSyncError, StepSyncResult};

use super::{RemoteStepFields, RemoteStepRow, RemoteStore};

/// Process-local remote tier with switchable faults, for tests and the demo.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    rows: Mutex<BTreeMap<(String, NaiveDate), RemoteStepFields>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    write_delay: StdMutex<Option<Duration>>,
    upserts: AtomicUsize,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reads_failing(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    pub fn set_writes_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.set_reads_failing(offline);
        self.set_writes_failing(offline);
    }

    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.delay_guard() = delay;
    }

    /// Successful upserts so far.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub async fn row(&self, user_id: &str, date: NaiveDate) -> Option<RemoteStepRow> {
        let rows = self.rows.lock().await;
        rows.get(&(user_id.to_string(), date))
            .cloned()
            .map(|fields| RemoteStepRow {
                user_id: user_id.to_string(),
                date,
                fields,
            })
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    fn delay_guard(&self) -> MutexGuard<'_, Option<Duration>> {
        match self.write_delay.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn upsert(
        &self,
        user_id: &str,
        date: NaiveDate,
        fields: RemoteStepFields,
    ) -> StepSyncResult<()> {
        let delay = *self.delay_guard();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StepSyncError::RemoteWriteFailure(
                "remote store unreachable".into(),
            ));
        }

        self.rows
            .lock()
            .await
            .insert((user_id.to_string(), date), fields);
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn range_query(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StepSyncResult<Vec<RemoteStepRow>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StepSyncError::RemoteReadFailure(
                "remote store unreachable".into(),
            ));
        }
        if start > end {
            return Err(StepSyncError::InvalidDateRange);
        }

        let rows = self.rows.lock().await;
        let lower = (user_id.to_string(), start);
        let upper = (user_id.to_string(), end);
        Ok(rows
            .range(lower..=upper)
            .map(|((user, date), fields)| RemoteStepRow {
                user_id: user.clone(),
                date: *date,
                fields: fields.clone(),
            })
            .collect())
    }
}
