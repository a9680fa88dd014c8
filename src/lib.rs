pub mod aggregation;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod goals;
pub mod health;
pub mod models;
pub mod motion;
pub mod remote;
pub mod store;
pub mod tracking;
pub mod utils;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use chrono::{Datelike, Local};
use log::{info, warn};

use api::StepTracker;
use config::StepSyncConfig;
use db::Database;
use goals::GoalStore;
use health::StaticHealthSource;
use motion::{SimulatedSensor, WalkingPattern};
use remote::InMemoryRemoteStore;
use store::StepStore;

pub use error::{StepSyncError, StepSyncResult};

const DEMO_WALK: Duration = Duration::from_secs(2);

/// Composition root for the demo binary: a short simulated walk through the
/// whole pipeline, then the resulting rollups.
pub async fn run() -> anyhow::Result<()> {
    let config = StepSyncConfig::from_env();
    utils::init_logging(config.debug);

    let db = Database::new(config.database_path())?;
    let goals = Arc::new(GoalStore::new(config.goals_path()).context("failed to load goals")?);
    let remote = Arc::new(InMemoryRemoteStore::new());
    let store = Arc::new(StepStore::new(db, remote, goals, config.user_id.clone()));

    // five samples per stride, ten strides a second
    let sensor = Arc::new(SimulatedSensor::walking(WalkingPattern {
        sample_rate_hz: 50.0,
        cadence_hz: 10.0,
        amplitude: 0.6,
    }));

    let tracker = StepTracker::new(store, sensor, config.detector, config.tracking.clone())
        .with_health_source(Arc::new(StaticHealthSource::new([250])));

    tracker.initialize().await;
    let mut events = tracker.subscribe();

    if !tracker.start_tracking().await {
        warn!("tracking unavailable; continuing with manual input only");
    }
    tokio::time::sleep(DEMO_WALK).await;
    tracker.stop_tracking().await;

    let stats = tracker.tracking_stats().await;
    info!(
        "walk finished: {} steps this session, {:.1} steps/min",
        stats.session_steps, stats.steps_per_minute
    );

    tracker.add_steps(500, None).await;
    tracker.sync_with_health_app().await;

    let today = tracker.today_data().await;
    info!(
        "today {}: {} steps, {} kcal, {:.2} km, {} active min, {:.0}% of goal",
        today.date,
        today.steps,
        today.calories,
        today.distance,
        today.active_minutes,
        today.goal_progress() * 100.0
    );

    let now = Local::now().date_naive();
    if let Some(week) = tracker
        .get_weekly_data(aggregation::week_start_for(now))
        .await
    {
        info!("week: {}", serde_json::to_string(&week.without_days())?);
    }
    if let Some(month) = tracker.get_monthly_data(now.year(), now.month()).await {
        info!("month: {}", serde_json::to_string(&month.without_days())?);
    }

    let mut event_count = 0;
    while events.try_recv().is_ok() {
        event_count += 1;
    }
    info!("{event_count} change events emitted");

    tracker.wait_for_pending_writes().await;
    Ok(())
}
