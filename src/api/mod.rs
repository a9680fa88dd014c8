//! Query façade for the view layer. Every call returns data or a boolean;
//! failures are logged here and surface as `false`, `None`, empty or default
//! data.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio::sync::broadcast;

use crate::{
    aggregation::{month_bounds, monthly_rollup, week_end, weekly_rollup},
    goals::GoalStore,
    health::HealthSource,
    models::{Goal, GoalPatch, MonthRollup, StepRecord, StepSource, WeekRollup},
    motion::{AccelSample, DetectorConfig, SensorSource},
    store::StepStore,
    tracking::{TrackingConfig, TrackingController, TrackingStats},
};

pub mod views;

pub use views::{TrackerEvent, ViewCache};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub struct StepTracker {
    controller: TrackingController,
    store: Arc<StepStore>,
    goals: Arc<GoalStore>,
    views: Arc<ViewCache>,
    health: Option<Arc<dyn HealthSource>>,
}

impl StepTracker {
    pub fn new(
        store: Arc<StepStore>,
        sensor: Arc<dyn SensorSource>,
        detector: DetectorConfig,
        tracking: TrackingConfig,
    ) -> Self {
        let views = Arc::new(ViewCache::new());
        let controller = TrackingController::new(
            store.clone(),
            sensor,
            views.clone(),
            detector,
            tracking,
        );
        Self {
            controller,
            goals: store.goals().clone(),
            store,
            views,
            health: None,
        }
    }

    pub fn with_health_source(mut self, source: Arc<dyn HealthSource>) -> Self {
        self.health = Some(source);
        self
    }

    /// Seed the counter and today's view from storage.
    pub async fn initialize(&self) -> bool {
        if !self.controller.sensor_available() {
            log_warn!("no motion sensor; step input limited to manual and health sync");
        }
        let record = self.controller.load_today().await;
        let record = self.views.offer_today(record).await;
        log_info!("step tracker ready: {} steps on {}", record.steps, record.date);
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.views.subscribe()
    }

    pub async fn today_data(&self) -> StepRecord {
        let today = Local::now().date_naive();
        if let Some(record) = self.views.today(today).await {
            return record;
        }
        let record = self.store.get_record(today).await;
        self.views.offer_today(record).await
    }

    pub async fn current_step_count(&self) -> u64 {
        self.controller.current_count().await
    }

    pub async fn is_tracking(&self) -> bool {
        self.controller.is_tracking().await
    }

    pub async fn tracking_stats(&self) -> TrackingStats {
        self.controller.stats().await
    }

    pub fn config(&self) -> Goal {
        self.goals.current()
    }

    pub async fn start_tracking(&self) -> bool {
        match self.controller.start().await {
            Ok(_) => true,
            Err(err) => {
                log_warn!("could not start tracking: {err}");
                false
            }
        }
    }

    pub async fn stop_tracking(&self) -> bool {
        match self.controller.stop().await {
            Ok(_) => true,
            Err(err) => {
                log_warn!("could not stop tracking cleanly: {err}");
                false
            }
        }
    }

    /// Feed one accelerometer sample into the live session. Platform
    /// adapters normally deliver samples through the sensor subscription.
    pub async fn ingest_sample(&self, sample: AccelSample) -> bool {
        self.controller.ingest_sample(sample).await
    }

    /// Add `steps` to today. Source defaults to manual.
    pub async fn add_steps(&self, steps: u64, source: Option<StepSource>) -> bool {
        let source = source.unwrap_or(StepSource::Manual);
        match self.controller.add_steps(steps, source).await {
            Ok(record) => {
                log_info!("added {steps} {} steps; today at {}", source.as_str(), record.steps);
                true
            }
            Err(err) => {
                log_warn!("failed to persist {steps} added steps: {err}");
                false
            }
        }
    }

    pub async fn sync_with_health_app(&self) -> bool {
        let Some(health) = &self.health else {
            log_warn!("health sync requested but no health source is configured");
            return false;
        };

        match health.fetch_step_delta().await {
            Ok(0) => true,
            Ok(delta) => self.add_steps(delta, Some(StepSource::HealthApp)).await,
            Err(err) => {
                log_warn!("health sync failed: {err}");
                false
            }
        }
    }

    /// Merge `patch` into the goals. Only future writes pick up the new
    /// daily goal.
    pub fn set_config(&self, patch: GoalPatch) -> bool {
        match self.goals.update(&patch) {
            Ok(goal) => {
                self.views.emit(TrackerEvent::GoalsChanged(goal));
                true
            }
            Err(err) => {
                log_warn!("rejected goal update: {err}");
                false
            }
        }
    }

    pub async fn get_step_data(&self, date: NaiveDate) -> StepRecord {
        self.store.get_record(date).await
    }

    pub async fn get_step_data_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<StepRecord> {
        match self.store.get_range(start, end).await {
            Ok(records) => records,
            Err(err) => {
                log_warn!("step range {start}..={end} unavailable: {err}");
                Vec::new()
            }
        }
    }

    /// Seven days starting at `week_start`. The result becomes the held
    /// weekly view.
    pub async fn get_weekly_data(&self, week_start: NaiveDate) -> Option<WeekRollup> {
        let records = match self.store.get_range(week_start, week_end(week_start)).await {
            Ok(records) => records,
            Err(err) => {
                log_warn!("weekly data for {week_start} unavailable: {err}");
                return None;
            }
        };
        let rollup = weekly_rollup(week_start, &records);
        self.views.hold_weekly(rollup.clone()).await;
        Some(rollup)
    }

    pub async fn get_monthly_data(&self, year: i32, month: u32) -> Option<MonthRollup> {
        let Some((first, last)) = month_bounds(year, month) else {
            log_warn!("no such month {year}-{month}");
            return None;
        };
        let records = match self.store.get_range(first, last).await {
            Ok(records) => records,
            Err(err) => {
                log_warn!("monthly data for {year}-{month:02} unavailable: {err}");
                return None;
            }
        };
        let rollup = monthly_rollup(year, month, &records)?;
        self.views.hold_monthly(rollup.clone()).await;
        Some(rollup)
    }

    pub async fn reset_today(&self) -> bool {
        match self.controller.reset_today().await {
            Ok(_) => true,
            Err(err) => {
                log_warn!("failed to reset today's steps: {err}");
                false
            }
        }
    }

    /// Wipe local records and goals. The remote tier keeps its rows.
    pub async fn clear_all_data(&self) -> bool {
        let mut cleared = true;

        if let Err(err) = self.store.clear_local().await {
            log_warn!("failed to clear cached step records: {err:#}");
            cleared = false;
        }
        if let Err(err) = self.goals.reset() {
            log_warn!("failed to reset goals: {err}");
            cleared = false;
        }

        self.controller.clear_counts().await;
        let today = StepRecord::empty(Local::now().date_naive(), self.goals.daily());
        self.views.reset(today).await;
        self.views.emit(TrackerEvent::DataCleared);
        cleared
    }

    /// Wait for every background remote write issued so far.
    pub async fn wait_for_pending_writes(&self) {
        self.store.wait_for_remote_writes().await;
    }
}
