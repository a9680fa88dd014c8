use std::sync::Arc;

use chrono::{Datelike, Duration, Local, NaiveDate};
use stepsync_lib::{
    aggregation::week_start_for,
    api::{StepTracker, TrackerEvent},
    db::Database,
    goals::GoalStore,
    models::{Goal, GoalPatch, StepRecord, StepSource},
    motion::{AccelSample, DetectorConfig, SimulatedSensor},
    remote::InMemoryRemoteStore,
    store::StepStore,
    tracking::TrackingConfig,
};

struct Fixture {
    tracker: StepTracker,
    store: Arc<StepStore>,
    remote: Arc<InMemoryRemoteStore>,
    sensor: Arc<SimulatedSensor>,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(InMemoryRemoteStore::new());
    let goals = Arc::new(GoalStore::new(dir.path().join("goals.json")).unwrap());
    let store = Arc::new(StepStore::new(
        Database::new(dir.path().join("steps.sqlite3")).unwrap(),
        remote.clone(),
        goals,
        "walker",
    ));
    let sensor = Arc::new(SimulatedSensor::manual());
    let tracker = StepTracker::new(
        store.clone(),
        sensor.clone(),
        DetectorConfig::default(),
        TrackingConfig::default(),
    );
    Fixture {
        tracker,
        store,
        remote,
        sensor,
        _dir: dir,
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn record(date: NaiveDate, steps: u64) -> StepRecord {
    StepRecord::with_steps(date, steps, [0; 24], 10_000, StepSource::Device)
}

#[tokio::test]
async fn manual_steps_produce_derived_metrics() {
    let f = fixture();
    assert!(f.tracker.initialize().await);
    assert_eq!(f.tracker.today_data().await.steps, 0);

    assert!(f.tracker.add_steps(500, None).await);
    let today = f.tracker.today_data().await;
    assert_eq!(today.steps, 500);
    assert_eq!(today.calories, 20);
    assert_eq!(today.distance, 0.40);
    assert_eq!(today.active_minutes, 5);
    assert_eq!(today.hourly_data.len(), 24);
    assert_eq!(f.tracker.current_step_count().await, 500);

    f.tracker.wait_for_pending_writes().await;
    let stored = f.tracker.get_step_data(today.date).await;
    assert_eq!(stored.steps, 500);
    assert_eq!(stored.calories, 20);
}

#[tokio::test]
async fn add_steps_increases_count_exactly() {
    let f = fixture();
    f.tracker.initialize().await;
    for s in [0, 1, 99, 4_321] {
        let before = f.tracker.current_step_count().await;
        assert!(f.tracker.add_steps(s, Some(StepSource::Estimated)).await);
        assert_eq!(f.tracker.current_step_count().await, before + s);
    }
}

#[tokio::test]
async fn goal_changes_do_not_rewrite_written_records() {
    let f = fixture();
    f.tracker.initialize().await;
    f.tracker.add_steps(1_000, None).await;
    f.tracker.wait_for_pending_writes().await;

    assert!(f.tracker.set_config(GoalPatch::daily(6_000)));
    let today = Local::now().date_naive();
    assert_eq!(f.tracker.get_step_data(today).await.goal, 10_000);

    f.tracker.add_steps(1, None).await;
    f.tracker.wait_for_pending_writes().await;
    assert_eq!(f.tracker.get_step_data(today).await.goal, 6_000);
    assert_eq!(f.tracker.config().weekly, Goal::default().weekly);
}

#[tokio::test]
async fn start_is_idempotent_and_stop_freezes_the_count() {
    let f = fixture();
    f.tracker.initialize().await;
    f.tracker.add_steps(100, None).await;

    assert!(f.tracker.start_tracking().await);
    let started = f.tracker.tracking_stats().await;
    assert!(started.is_tracking);
    assert_eq!(started.current_count, 100);

    for _ in 0..4 {
        f.tracker.ingest_sample(AccelSample::new(0.0, 0.0, 1.0)).await;
        f.tracker.ingest_sample(AccelSample::new(0.0, 0.0, 1.6)).await;
    }

    assert!(f.tracker.start_tracking().await);
    let again = f.tracker.tracking_stats().await;
    assert_eq!(again.tracking_start_time, started.tracking_start_time);
    assert_eq!(again.current_count, 104);
    assert_eq!(again.session_steps, 4);

    assert!(f.tracker.stop_tracking().await);
    assert!(!f.tracker.is_tracking().await);
    assert!(!f.sensor.is_subscribed());

    assert!(!f.tracker.ingest_sample(AccelSample::new(0.0, 0.0, 1.0)).await);
    assert!(!f.tracker.ingest_sample(AccelSample::new(0.0, 0.0, 1.6)).await);
    assert!(!f.sensor.push(AccelSample::new(0.0, 0.0, 1.6)));
    f.tracker.wait_for_pending_writes().await;
    assert_eq!(f.tracker.current_step_count().await, 104);
    assert!(!f.tracker.is_tracking().await);

    let today = f.tracker.today_data().await;
    assert_eq!(today.steps, 104);
    assert!(!today.is_real_time);
}

#[tokio::test]
async fn week_average_uses_constant_divisor() {
    let f = fixture();
    let monday = day(2024, 4, 1);
    for (offset, steps) in [(0, 500), (2, 3_500), (5, 5_000)] {
        f.store
            .save_record(&record(monday + Duration::days(offset), steps))
            .await
            .unwrap();
    }
    f.store.wait_for_remote_writes().await;

    let week = f.tracker.get_weekly_data(monday).await.unwrap();
    assert_eq!(week.total_steps, 9_000);
    assert_eq!(week.average_steps, 1_285);
    assert_eq!(week.days_active, 2);
    assert_eq!(week.week_end, day(2024, 4, 7));
}

#[tokio::test]
async fn month_average_uses_fetched_days() {
    let f = fixture();
    for d in 1..=30 {
        f.store.save_record(&record(day(2024, 6, d), 0)).await.unwrap();
    }
    f.store.wait_for_remote_writes().await;

    let month = f.tracker.get_monthly_data(2024, 6).await.unwrap();
    assert_eq!(month.total_steps, 0);
    assert_eq!(month.average_steps, 0);
    assert_eq!(month.days_active, 0);
    assert_eq!(month.days_recorded, 30);
    assert_eq!(month.weekly_breakdown.len(), 5);
    assert_eq!(month.weekly_breakdown[4].days, 2);

    f.store.save_record(&record(day(2024, 7, 1), 3_000)).await.unwrap();
    f.store.save_record(&record(day(2024, 7, 2), 1_000)).await.unwrap();
    f.store.wait_for_remote_writes().await;
    let july = f.tracker.get_monthly_data(2024, 7).await.unwrap();
    assert_eq!(july.average_steps, 2_000);
}

#[tokio::test]
async fn mutations_refresh_only_windows_holding_the_date() {
    let f = fixture();
    f.tracker.initialize().await;
    let today = Local::now().date_naive();

    f.tracker.get_weekly_data(week_start_for(today)).await.unwrap();
    f.tracker
        .get_monthly_data(today.year(), today.month())
        .await
        .unwrap();
    let mut events = f.tracker.subscribe();

    f.tracker.add_steps(2_000, None).await;

    let mut week_total = None;
    let mut month_total = None;
    while let Ok(event) = events.try_recv() {
        match event {
            TrackerEvent::WeeklyRefreshed(week) => week_total = Some(week.total_steps),
            TrackerEvent::MonthlyRefreshed(month) => month_total = Some(month.total_steps),
            _ => {}
        }
    }
    assert_eq!(week_total, Some(2_000));
    assert_eq!(month_total, Some(2_000));

    // a held week far in the past is left alone
    f.tracker.get_weekly_data(day(2020, 1, 6)).await.unwrap();
    f.tracker.add_steps(10, None).await;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, TrackerEvent::WeeklyRefreshed(_)));
    }
}

#[tokio::test]
async fn remote_outage_degrades_to_local_data() {
    let f = fixture();
    f.tracker.initialize().await;
    f.remote.set_offline(true);

    assert!(f.tracker.add_steps(750, None).await);
    f.tracker.wait_for_pending_writes().await;
    assert_eq!(f.remote.len().await, 0);

    let today = Local::now().date_naive();
    let fetched = f.tracker.get_step_data(today).await;
    assert_eq!(fetched.steps, 750);
    assert_eq!(f.tracker.get_step_data_range(today, today).await.len(), 1);

    let unknown = f.tracker.get_step_data(day(2019, 2, 3)).await;
    assert_eq!(unknown.steps, 0);
    assert_eq!(unknown.goal, 10_000);
}

#[tokio::test]
async fn remote_reads_synthesize_bounded_hourly_data() {
    let f = fixture();
    let date = day(2024, 9, 9);
    f.store.save_record(&record(date, 8_000)).await.unwrap();
    f.store.wait_for_remote_writes().await;

    let fetched = f.tracker.get_step_data(date).await;
    assert_eq!(fetched.steps, 8_000);
    let sum: u64 = fetched.hourly_data.iter().sum();
    assert!(sum <= 8_000);
    assert!(sum >= 7_200, "synthesized sum {sum}");
}

#[tokio::test]
async fn add_steps_before_initialize_keeps_stored_steps() {
    let f = fixture();
    let today = Local::now().date_naive();
    f.store.save_record(&record(today, 5_000)).await.unwrap();
    f.store.wait_for_remote_writes().await;

    assert!(f.tracker.add_steps(500, None).await);
    assert_eq!(f.tracker.current_step_count().await, 5_500);

    f.tracker.wait_for_pending_writes().await;
    assert_eq!(f.tracker.get_step_data(today).await.steps, 5_500);
}

#[tokio::test]
async fn remote_write_completing_after_stop_changes_nothing() {
    let f = fixture();
    f.tracker.initialize().await;
    f.remote.set_write_delay(Some(std::time::Duration::from_millis(150)));

    assert!(f.tracker.start_tracking().await);
    for _ in 0..3 {
        f.tracker.ingest_sample(AccelSample::new(0.0, 0.0, 1.0)).await;
        f.tracker.ingest_sample(AccelSample::new(0.0, 0.0, 1.6)).await;
    }
    assert!(f.tracker.stop_tracking().await);
    assert_eq!(f.remote.len().await, 0);

    let stopped_count = f.tracker.current_step_count().await;
    assert_eq!(stopped_count, 3);

    f.tracker.wait_for_pending_writes().await;
    let row = f.remote.row("walker", Local::now().date_naive()).await.unwrap();
    assert_eq!(row.fields.steps, 3);
    assert_eq!(f.tracker.current_step_count().await, stopped_count);
    assert!(!f.tracker.is_tracking().await);
    assert!(!f.tracker.tracking_stats().await.is_tracking);
}
