use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{Local, Timelike, Utc};
use tokio::{sync::Mutex, task::JoinHandle, time};
use uuid::Uuid;

use crate::{
    error::{StepSyncError, StepSyncResult},
    motion::{AccelSample, DetectorConfig, MotionProcessor, SensorSource},
    models::{StepRecord, StepSource},
    store::StepStore,
};

use super::{
    sensing::{apply_sample, SensingController},
    state::add_hourly,
    ClosedDay, TrackingState, TrackingStats,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// How often a live session writes its counter through to storage.
    pub flush_interval: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(30),
        }
    }
}

/// Receives every flushed record and every lifecycle transition.
#[async_trait]
pub trait TrackingObserver: Send + Sync {
    async fn record_flushed(&self, record: &StepRecord);

    async fn tracking_changed(&self, stats: &TrackingStats);
}

pub struct NoopObserver;

#[async_trait]
impl TrackingObserver for NoopObserver {
    async fn record_flushed(&self, _record: &StepRecord) {}

    async fn tracking_changed(&self, _stats: &TrackingStats) {}
}

/// `Stopped -> Tracking -> Stopped` state machine around the day's counter.
#[derive(Clone)]
pub struct TrackingController {
    state: Arc<Mutex<TrackingState>>,
    processor: Arc<Mutex<MotionProcessor>>,
    store: Arc<StepStore>,
    sensor: Arc<dyn SensorSource>,
    observer: Arc<dyn TrackingObserver>,
    sensing: Arc<Mutex<SensingController>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    flush_lock: Arc<Mutex<()>>,
    config: TrackingConfig,
}

impl TrackingController {
    pub fn new(
        store: Arc<StepStore>,
        sensor: Arc<dyn SensorSource>,
        observer: Arc<dyn TrackingObserver>,
        detector: DetectorConfig,
        config: TrackingConfig,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackingState::default())),
            processor: Arc::new(Mutex::new(MotionProcessor::new(detector))),
            store,
            sensor,
            observer,
            sensing: Arc::new(Mutex::new(SensingController::new())),
            ticker: Arc::new(Mutex::new(None)),
            flush_lock: Arc::new(Mutex::new(())),
            config,
        }
    }

    pub async fn stats(&self) -> TrackingStats {
        self.state.lock().await.stats(Utc::now())
    }

    pub async fn is_tracking(&self) -> bool {
        self.state.lock().await.is_tracking()
    }

    pub async fn current_count(&self) -> u64 {
        self.state.lock().await.current_count
    }

    pub fn sensor_available(&self) -> bool {
        self.sensor.is_available()
    }

    /// Seed the counter from storage for today. Ignored while tracking.
    pub async fn load_today(&self) -> StepRecord {
        let today = Local::now().date_naive();
        let record = self.store.get_record(today).await;

        let mut state = self.state.lock().await;
        if !state.is_tracking() {
            state.roll_over(today);
            state.seed_from(&record);
        }
        record
    }

    /// Start a live session. Returns the current stats unchanged when a
    /// session is already running.
    pub async fn start(&self) -> StepSyncResult<TrackingStats> {
        // held until the ticker runs, so a concurrent stop tears down
        // whatever this call sets up
        let mut sensing = self.sensing.lock().await;

        {
            let state = self.state.lock().await;
            if state.is_tracking() {
                return Ok(state.stats(Utc::now()));
            }
        }

        if !self.sensor.is_available() {
            log_warn!("motion sensor unavailable; staying in manual-input mode");
            return Err(StepSyncError::SensorUnavailable);
        }

        let today = Local::now().date_naive();
        let seed = self.store.get_record(today).await;
        let session_id = Uuid::new_v4().to_string();

        let stats = {
            let mut state = self.state.lock().await;
            if state.is_tracking() {
                return Ok(state.stats(Utc::now()));
            }
            state.roll_over(today);
            state.seed_from(&seed);
            state.begin_session(session_id.clone(), Utc::now());
            state.stats(Utc::now())
        };

        self.processor.lock().await.reset();

        let started = sensing.start_sensing(
            session_id.clone(),
            self.sensor.as_ref(),
            self.state.clone(),
            self.processor.clone(),
        );
        if let Err(err) = started {
            log_error!("failed to subscribe to motion sensor: {err}");
            self.state.lock().await.stop();
            return Err(err);
        }

        self.spawn_ticker().await;

        log_info!(
            "tracking session {session_id} started at {} steps",
            stats.current_count
        );
        self.observer.tracking_changed(&stats).await;
        drop(sensing);
        Ok(stats)
    }

    /// Stop the live session: cancel the tick, drop the sensor subscription,
    /// flush once more. The count is frozen from here on.
    pub async fn stop(&self) -> StepSyncResult<TrackingStats> {
        let session_id = {
            let mut sensing = self.sensing.lock().await;
            let session_id = {
                let mut state = self.state.lock().await;
                if !state.is_tracking() {
                    return Ok(state.stats(Utc::now()));
                }
                let session_id = state.session_id.clone();
                state.stop();
                session_id
            };
            self.cancel_ticker().await;
            sensing.stop_sensing(self.sensor.as_ref()).await;
            session_id
        };

        if let Err(err) = self.flush().await {
            log_error!("final flush after stopping tracking failed: {err}");
        }

        let stats = self.stats().await;
        log_info!(
            "tracking session {} stopped at {} steps ({} this session)",
            session_id.unwrap_or_default(),
            stats.current_count,
            stats.session_steps
        );
        self.observer.tracking_changed(&stats).await;
        Ok(stats)
    }

    /// Feed a sample straight into the live session, bypassing the sensor.
    pub async fn ingest_sample(&self, sample: AccelSample) -> bool {
        let session_id = {
            let state = self.state.lock().await;
            match (&state.session_id, state.is_tracking()) {
                (Some(id), true) => id.clone(),
                _ => return false,
            }
        };
        apply_sample(&self.state, &self.processor, &session_id, &sample).await
    }

    /// Add steps to today's counter and write the result through.
    pub async fn add_steps(&self, steps: u64, source: StepSource) -> StepSyncResult<StepRecord> {
        self.ensure_seeded().await;
        {
            let now = Local::now();
            let mut state = self.state.lock().await;
            state.roll_over(now.date_naive());
            state.add_steps(steps, now.hour() as usize, source);
        }
        self.flush().await
    }

    /// Zero today's record.
    pub async fn reset_today(&self) -> StepSyncResult<StepRecord> {
        {
            let mut state = self.state.lock().await;
            state.roll_over(Local::now().date_naive());
            state.reset_counts();
        }
        self.flush().await
    }

    /// Forget the in-memory counts after a bulk clear. A running session
    /// keeps running from zero.
    pub async fn clear_counts(&self) {
        let _flush = self.flush_lock.lock().await;
        let mut state = self.state.lock().await;
        state.roll_over(Local::now().date_naive());
        state.take_closed_days();
        state.reset_counts();
        state.last_source = StepSource::Device;
    }

    /// Write the counter through to both tiers. Serialised so an older
    /// snapshot never lands after a newer one.
    pub async fn flush(&self) -> StepSyncResult<StepRecord> {
        self.ensure_seeded().await;
        let _flush = self.flush_lock.lock().await;

        let (closed, record, seeded) = {
            let mut state = self.state.lock().await;
            state.roll_over(Local::now().date_naive());
            let mut record = StepRecord::with_steps(
                state.date,
                state.current_count,
                state.hourly_steps,
                self.store.goals().daily(),
                state.last_source,
            );
            record.is_real_time = state.is_tracking();
            (state.take_closed_days(), record, state.seeded)
        };

        self.save_closed(closed).await;
        if !seeded {
            // day turned over after seeding; the next flush merges and writes it
            log_warn!("skipping write for unseeded {}", record.date);
            return Ok(record);
        }
        self.store.save_record(&record).await?;
        self.observer.record_flushed(&record).await;
        Ok(record)
    }

    /// Merge today's stored record into the counter before its first write.
    async fn ensure_seeded(&self) {
        let today = Local::now().date_naive();
        if self.state.lock().await.is_seeded_for(today) {
            return;
        }

        let stored = self.store.get_record(today).await;
        let mut state = self.state.lock().await;
        state.roll_over(today);
        if !state.is_seeded_for(today) {
            state.seed_from(&stored);
            log_info!("seeded {today} from storage at {} steps", state.current_count);
        }
    }

    async fn save_closed(&self, closed: Vec<ClosedDay>) {
        for day in closed {
            let (steps, hourly) = if day.seeded {
                (day.steps, day.hourly_steps)
            } else {
                let stored = self.store.get_record(day.date).await;
                (
                    stored.steps.saturating_add(day.steps),
                    add_hourly(&stored.hourly_data, &day.hourly_steps),
                )
            };
            log_info!("closing out {} at {steps} steps", day.date);

            let record = StepRecord::with_steps(
                day.date,
                steps,
                hourly,
                self.store.goals().daily(),
                day.source,
            );
            match self.store.save_record(&record).await {
                Ok(()) => self.observer.record_flushed(&record).await,
                Err(err) => log_error!("failed to save closed-out day {}: {err:#}", record.date),
            }
        }
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let controller = self.clone();
        let tick_interval = self.config.flush_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            // first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                if !controller.is_tracking().await {
                    break;
                }

                if let Err(err) = controller.flush().await {
                    log_error!("periodic flush failed: {err}");
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::Database,
        goals::GoalStore,
        models::{Goal, GoalPatch},
        motion::{SimulatedSensor, UnavailableSensor},
        remote::InMemoryRemoteStore,
    };

    struct Harness {
        controller: TrackingController,
        store: Arc<StepStore>,
        remote: Arc<InMemoryRemoteStore>,
        sensor: Arc<SimulatedSensor>,
    }

    fn harness(flush_interval: Duration) -> Harness {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let store = Arc::new(StepStore::new(
            Database::in_memory().unwrap(),
            remote.clone(),
            Arc::new(GoalStore::in_memory(Goal::default())),
            "tester",
        ));
        let sensor = Arc::new(SimulatedSensor::manual());
        let controller = TrackingController::new(
            store.clone(),
            sensor.clone(),
            Arc::new(NoopObserver),
            DetectorConfig::default(),
            TrackingConfig { flush_interval },
        );
        Harness {
            controller,
            store,
            remote,
            sensor,
        }
    }

    fn step_pair() -> [AccelSample; 2] {
        [AccelSample::new(0.0, 0.0, 1.0), AccelSample::new(0.0, 0.0, 1.6)]
    }

    async fn walk(controller: &TrackingController, steps: usize) {
        for _ in 0..steps {
            for sample in step_pair() {
                controller.ingest_sample(sample).await;
            }
        }
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let h = harness(Duration::from_secs(3600));
        let first = h.controller.start().await.unwrap();
        walk(&h.controller, 5).await;

        let second = h.controller.start().await.unwrap();
        assert!(second.is_tracking);
        assert_eq!(second.tracking_start_time, first.tracking_start_time);
        assert_eq!(second.current_count, 5);
        h.controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_seeds_from_persisted_today() {
        let h = harness(Duration::from_secs(3600));
        let today = Local::now().date_naive();
        let seeded = StepRecord::with_steps(today, 2_500, [0; 24], 10_000, StepSource::Manual);
        h.store.save_record(&seeded).await.unwrap();
        h.store.wait_for_remote_writes().await;

        let stats = h.controller.start().await.unwrap();
        assert_eq!(stats.current_count, 2_500);
        assert_eq!(stats.session_steps, 0);
        h.controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unavailable_sensor_never_starts() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let store = Arc::new(StepStore::new(
            Database::in_memory().unwrap(),
            remote,
            Arc::new(GoalStore::in_memory(Goal::default())),
            "tester",
        ));
        let controller = TrackingController::new(
            store,
            Arc::new(UnavailableSensor),
            Arc::new(NoopObserver),
            DetectorConfig::default(),
            TrackingConfig::default(),
        );

        assert!(matches!(
            controller.start().await,
            Err(StepSyncError::SensorUnavailable)
        ));
        assert!(!controller.is_tracking().await);

        // manual input still works
        let record = controller.add_steps(250, StepSource::Manual).await.unwrap();
        assert_eq!(record.steps, 250);
    }

    #[tokio::test]
    async fn stop_freezes_the_count_and_flushes() {
        let h = harness(Duration::from_secs(3600));
        h.controller.start().await.unwrap();
        walk(&h.controller, 12).await;

        let stats = h.controller.stop().await.unwrap();
        assert!(!stats.is_tracking);
        assert_eq!(stats.current_count, 12);
        assert!(!h.sensor.is_subscribed());

        walk(&h.controller, 4).await;
        assert!(!h.sensor.push(AccelSample::new(0.0, 0.0, 1.6)));
        assert_eq!(h.controller.current_count().await, 12);

        h.store.wait_for_remote_writes().await;
        let today = Local::now().date_naive();
        let row = h.remote.row("tester", today).await.unwrap();
        assert_eq!(row.fields.steps, 12);
        assert_eq!(row.fields.source, StepSource::Device);
    }

    #[tokio::test]
    async fn stop_when_stopped_is_a_no_op() {
        let h = harness(Duration::from_secs(3600));
        let stats = h.controller.stop().await.unwrap();
        assert!(!stats.is_tracking);
        assert_eq!(h.remote.upsert_count(), 0);
    }

    #[tokio::test]
    async fn ticker_flushes_live_record() {
        let h = harness(Duration::from_millis(40));
        h.controller.start().await.unwrap();
        walk(&h.controller, 3).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        h.store.wait_for_remote_writes().await;

        let today = Local::now().date_naive();
        let row = h.remote.row("tester", today).await.unwrap();
        assert_eq!(row.fields.steps, 3);
        h.controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn flush_marks_real_time_only_while_tracking() {
        let h = harness(Duration::from_secs(3600));
        h.controller.start().await.unwrap();
        assert!(h.controller.flush().await.unwrap().is_real_time);
        h.controller.stop().await.unwrap();
        assert!(!h.controller.flush().await.unwrap().is_real_time);
    }

    #[tokio::test]
    async fn add_steps_is_exact_and_snapshots_goal() {
        let h = harness(Duration::from_secs(3600));
        let before = h.controller.current_count().await;
        let record = h.controller.add_steps(500, StepSource::Manual).await.unwrap();
        assert_eq!(h.controller.current_count().await, before + 500);
        assert_eq!(record.calories, 20);
        assert_eq!(record.distance, 0.40);
        assert_eq!(record.active_minutes, 5);
        assert_eq!(record.goal, 10_000);

        h.store.goals().update(&GoalPatch::daily(6_000)).unwrap();
        let later = h.controller.add_steps(1, StepSource::Manual).await.unwrap();
        assert_eq!(later.goal, 6_000);
    }

    #[tokio::test]
    async fn remote_outage_does_not_fail_flush() {
        let h = harness(Duration::from_secs(3600));
        h.remote.set_offline(true);
        let record = h.controller.add_steps(42, StepSource::Manual).await.unwrap();
        assert_eq!(record.steps, 42);
        h.store.wait_for_remote_writes().await;
        assert_eq!(h.remote.len().await, 0);
        assert_eq!(h.store.get_record(record.date).await.steps, 42);
    }

    #[tokio::test]
    async fn reset_today_zeroes_the_record() {
        let h = harness(Duration::from_secs(3600));
        h.controller.add_steps(800, StepSource::Manual).await.unwrap();
        let record = h.controller.reset_today().await.unwrap();
        assert_eq!(record.steps, 0);
        assert_eq!(h.controller.current_count().await, 0);
    }

    #[tokio::test]
    async fn first_mutation_builds_on_the_stored_day() {
        let h = harness(Duration::from_secs(3600));
        let today = Local::now().date_naive();
        let stored = StepRecord::with_steps(today, 5_000, [0; 24], 10_000, StepSource::Device);
        h.store.save_record(&stored).await.unwrap();
        h.store.wait_for_remote_writes().await;

        let record = h.controller.add_steps(500, StepSource::Manual).await.unwrap();
        assert_eq!(record.steps, 5_500);
        assert_eq!(h.controller.current_count().await, 5_500);

        h.store.wait_for_remote_writes().await;
        assert_eq!(h.store.get_record(today).await.steps, 5_500);
    }

    #[tokio::test]
    async fn racing_stop_never_leaves_the_sensor_subscribed() {
        for _ in 0..20 {
            let h = harness(Duration::from_secs(3600));
            let starter = h.controller.clone();
            let stopper = h.controller.clone();
            let start = tokio::spawn(async move { starter.start().await });
            let stop = tokio::spawn(async move {
                tokio::task::yield_now().await;
                stopper.stop().await
            });
            start.await.unwrap().unwrap();
            stop.await.unwrap().unwrap();

            assert_eq!(h.controller.is_tracking().await, h.sensor.is_subscribed());
            h.controller.stop().await.unwrap();
            assert!(!h.sensor.is_subscribed());
        }
    }
}
