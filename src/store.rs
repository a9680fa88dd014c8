//! Offline-first persistence across two tiers with no shared transaction.
//!
//! Writes always land in the local cache first and are awaited; the remote
//! upsert is spawned and never awaited by the caller, and its failure is only
//! logged. Remote upserts are chained so they land in the order they were
//! issued. Reads try the remote tier first, then the local cache, then a
//! zero-value default. The tiers may diverge: local wins until the next
//! successful remote read, and nothing reconciles them beyond that.

use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;

use crate::{
    aggregation::synthesize_hourly,
    db::Database,
    error::{StepSyncError, StepSyncResult},
    goals::GoalStore,
    models::StepRecord,
    remote::{RemoteStepFields, RemoteStepRow, RemoteStore},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const REMOTE_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct StepStore {
    db: Database,
    remote: Arc<dyn RemoteStore>,
    goals: Arc<GoalStore>,
    user_id: String,
    remote_writes: TaskTracker,
    /// Completion signal of the most recently issued remote upsert.
    last_remote_write: StdMutex<Option<oneshot::Receiver<()>>>,
}

impl StepStore {
    pub fn new(
        db: Database,
        remote: Arc<dyn RemoteStore>,
        goals: Arc<GoalStore>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            db,
            remote,
            goals,
            user_id: user_id.into(),
            remote_writes: TaskTracker::new(),
            last_remote_write: StdMutex::new(None),
        }
    }

    pub fn goals(&self) -> &Arc<GoalStore> {
        &self.goals
    }

    /// Write-through. Succeeds once the local cache has the record; the
    /// remote upsert runs in the background.
    pub async fn save_record(&self, record: &StepRecord) -> Result<()> {
        self.db
            .upsert_step_record(record)
            .await
            .with_context(|| format!("failed to cache step record for {}", record.date))?;

        let remote = Arc::clone(&self.remote);
        let user_id = self.user_id.clone();
        let date = record.date;
        let fields = RemoteStepFields::from(record);

        let (done_tx, done_rx) = oneshot::channel();
        let previous = {
            let mut last = match self.last_remote_write.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            last.replace(done_rx)
        };

        self.remote_writes.spawn(async move {
            if let Some(previous) = previous {
                // resolves once the earlier upsert finished, sent or not
                let _ = previous.await;
            }
            match remote.upsert(&user_id, date, fields).await {
                Ok(()) => log_debug!("remote upsert for {date} succeeded"),
                Err(err) => log_warn!("remote upsert for {date} failed; keeping local copy: {err}"),
            }
            let _ = done_tx.send(());
        });

        Ok(())
    }

    /// Never fails: remote, then local, then a zero record carrying the
    /// current daily goal.
    pub async fn get_record(&self, date: NaiveDate) -> StepRecord {
        match self.fetch_remote(date, date).await {
            Ok(rows) => {
                if let Some(row) = rows.into_iter().find(|row| row.date == date) {
                    return record_from_remote(row);
                }
                log_debug!("remote has no record for {date}; checking local cache");
            }
            Err(err) => log_warn!("remote read for {date} failed, using local cache: {err}"),
        }

        match self.db.get_step_record(date).await {
            Ok(Some(record)) => record,
            Ok(None) => StepRecord::empty(date, self.goals.daily()),
            Err(err) => {
                log_warn!("local read for {date} failed, using empty record: {err:#}");
                StepRecord::empty(date, self.goals.daily())
            }
        }
    }

    /// Records that exist in `[start, end]`, ordered by date. Missing days
    /// are absent, not zero-filled.
    pub async fn get_range(&self, start: NaiveDate, end: NaiveDate) -> StepSyncResult<Vec<StepRecord>> {
        if start > end {
            return Err(StepSyncError::InvalidDateRange);
        }

        match self.fetch_remote(start, end).await {
            Ok(rows) if !rows.is_empty() => {
                let mut records: Vec<StepRecord> =
                    rows.into_iter().map(record_from_remote).collect();
                records.sort_by_key(|record| record.date);
                return Ok(records);
            }
            Ok(_) => log_debug!("remote has no records for {start}..={end}; checking local cache"),
            Err(err) => log_warn!("remote range read {start}..={end} failed, using local cache: {err}"),
        }

        match self.db.get_step_records_in_range(start, end).await {
            Ok(records) => Ok(records),
            Err(err) => {
                log_warn!("local range read {start}..={end} failed: {err:#}");
                Ok(Vec::new())
            }
        }
    }

    /// Wipe the local tier. The remote tier is left alone.
    pub async fn clear_local(&self) -> Result<usize> {
        let removed = self.db.delete_all_step_records().await?;
        log_info!("cleared {removed} cached step records");
        Ok(removed)
    }

    /// Wait for every remote write spawned so far.
    pub async fn wait_for_remote_writes(&self) {
        self.remote_writes.close();
        self.remote_writes.wait().await;
        self.remote_writes.reopen();
    }

    async fn fetch_remote(&self, start: NaiveDate, end: NaiveDate) -> StepSyncResult<Vec<RemoteStepRow>> {
        match tokio::time::timeout(
            REMOTE_READ_TIMEOUT,
            self.remote.range_query(&self.user_id, start, end),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StepSyncError::RemoteReadFailure(format!(
                "timed out after {}s",
                REMOTE_READ_TIMEOUT.as_secs()
            ))),
        }
    }
}

/// The remote tier only knows the total, so the histogram is synthesized and
/// the derived fields recomputed from the steps.
fn record_from_remote(row: RemoteStepRow) -> StepRecord {
    let fields = row.fields;
    let mut record = StepRecord::with_steps(
        row.date,
        fields.steps,
        synthesize_hourly(fields.steps),
        fields.goal,
        fields.source,
    );
    record.last_updated = fields.last_updated;
    record
}
