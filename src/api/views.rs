use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

use crate::{
    aggregation::{refresh_month, refresh_week},
    models::{Goal, MonthRollup, StepRecord, WeekRollup},
    tracking::{TrackingObserver, TrackingStats},
};

const EVENT_CAPACITY: usize = 64;

/// Change notifications for whatever view layer sits on top.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum TrackerEvent {
    TodayUpdated(StepRecord),
    WeeklyRefreshed(WeekRollup),
    MonthlyRefreshed(MonthRollup),
    TrackingChanged(TrackingStats),
    GoalsChanged(Goal),
    DataCleared,
}

#[derive(Default)]
struct HeldViews {
    today: Option<StepRecord>,
    weekly: Option<WeekRollup>,
    monthly: Option<MonthRollup>,
}

/// The today/week/month views last handed out, patched in place when a day
/// inside them changes.
pub struct ViewCache {
    held: Mutex<HeldViews>,
    events: broadcast::Sender<TrackerEvent>,
}

impl ViewCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            held: Mutex::new(HeldViews::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: TrackerEvent) {
        // no receivers is fine
        let _ = self.events.send(event);
    }

    pub async fn today(&self, today: NaiveDate) -> Option<StepRecord> {
        self.held
            .lock()
            .await
            .today
            .clone()
            .filter(|record| record.date == today)
    }

    /// Hold `record` as today's view unless the held one for the same day is
    /// already ahead of it.
    pub async fn offer_today(&self, record: StepRecord) -> StepRecord {
        let mut held = self.held.lock().await;
        if let Some(current) = &held.today {
            if current.date == record.date && current.steps > record.steps {
                return current.clone();
            }
        }
        held.today = Some(record.clone());
        record
    }

    pub async fn weekly(&self) -> Option<WeekRollup> {
        self.held.lock().await.weekly.clone()
    }

    pub async fn monthly(&self) -> Option<MonthRollup> {
        self.held.lock().await.monthly.clone()
    }

    pub async fn hold_weekly(&self, rollup: WeekRollup) {
        self.held.lock().await.weekly = Some(rollup);
    }

    pub async fn hold_monthly(&self, rollup: MonthRollup) {
        self.held.lock().await.monthly = Some(rollup);
    }

    /// Drop every held view and hold `today` in their place.
    pub async fn reset(&self, today: StepRecord) {
        let mut held = self.held.lock().await;
        *held = HeldViews {
            today: Some(today),
            ..HeldViews::default()
        };
    }

    /// Patch every held view whose window contains `record.date`. Views that
    /// do not contain it are left alone.
    pub async fn apply_record(&self, record: &StepRecord) {
        let mut held = self.held.lock().await;

        let is_today = record.date == Local::now().date_naive();
        let holds_day = held
            .today
            .as_ref()
            .is_some_and(|today| today.date == record.date);
        if is_today || holds_day {
            held.today = Some(record.clone());
            self.emit(TrackerEvent::TodayUpdated(record.clone()));
        }

        if let Some(week) = held.weekly.as_ref().filter(|week| week.contains(record.date)) {
            let refreshed = refresh_week(week, record);
            self.emit(TrackerEvent::WeeklyRefreshed(refreshed.clone()));
            held.weekly = Some(refreshed);
        }

        if let Some(month) = held.monthly.as_ref().filter(|month| month.contains(record.date)) {
            if let Some(refreshed) = refresh_month(month, record) {
                self.emit(TrackerEvent::MonthlyRefreshed(refreshed.clone()));
                held.monthly = Some(refreshed);
            }
        }
    }
}

impl Default for ViewCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingObserver for ViewCache {
    async fn record_flushed(&self, record: &StepRecord) {
        self.apply_record(record).await;
    }

    async fn tracking_changed(&self, stats: &TrackingStats) {
        self.emit(TrackerEvent::TrackingChanged(stats.clone()));
    }
}
