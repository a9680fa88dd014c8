use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{HourlySteps, StepRecord, StepSource, HOURS_PER_DAY};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TrackingStatus {
    #[default]
    Stopped,
    Tracking,
}

/// A day closed out by a rollover, waiting for its last write.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedDay {
    pub date: NaiveDate,
    pub steps: u64,
    pub hourly_steps: HourlySteps,
    pub source: StepSource,
    /// False when the counts were never merged with the day's stored record.
    pub seeded: bool,
}

/// In-memory counter for the current day plus the live session lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingState {
    pub status: TrackingStatus,
    pub session_id: Option<String>,
    /// Calendar day the counter belongs to.
    pub date: NaiveDate,
    pub tracking_start_time: Option<DateTime<Utc>>,
    pub current_count: u64,
    pub hourly_steps: HourlySteps,
    /// Count when the session started; the difference is the session's steps.
    pub session_baseline: u64,
    pub last_source: StepSource,
    /// Whether the stored record for `date` has been merged in.
    #[serde(default)]
    pub seeded: bool,
    #[serde(skip)]
    pub closed_days: Vec<ClosedDay>,
}

impl Default for TrackingState {
    fn default() -> Self {
        Self::for_date(Local::now().date_naive())
    }
}

/// Read-only view handed to observers and the façade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStats {
    pub is_tracking: bool,
    pub tracking_start_time: Option<DateTime<Utc>>,
    pub date: NaiveDate,
    pub current_count: u64,
    pub session_steps: u64,
    pub elapsed_secs: u64,
    pub steps_per_minute: f64,
    pub hourly_steps: HourlySteps,
}

pub fn add_hourly(left: &HourlySteps, right: &HourlySteps) -> HourlySteps {
    let mut sum = *left;
    for (slot, extra) in sum.iter_mut().zip(right) {
        *slot = slot.saturating_add(*extra);
    }
    sum
}

impl TrackingState {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            status: TrackingStatus::Stopped,
            session_id: None,
            date,
            tracking_start_time: None,
            current_count: 0,
            hourly_steps: [0; HOURS_PER_DAY],
            session_baseline: 0,
            last_source: StepSource::Device,
            seeded: false,
            closed_days: Vec::new(),
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.status == TrackingStatus::Tracking
    }

    pub fn is_seeded_for(&self, today: NaiveDate) -> bool {
        self.seeded && self.date == today
    }

    /// Load counts from a persisted record.
    ///
    /// Steps counted before the day was seeded stack on top of the stored
    /// record. Once seeded, an in-memory count for the same day that is
    /// already ahead is kept, so the day never counts backwards.
    pub fn seed_from(&mut self, record: &StepRecord) {
        if record.date == self.date {
            if !self.seeded {
                if self.current_count == 0 {
                    self.last_source = record.source;
                }
                self.current_count = self.current_count.saturating_add(record.steps);
                self.hourly_steps = add_hourly(&self.hourly_steps, &record.hourly_data);
                self.session_baseline = self.session_baseline.saturating_add(record.steps);
                self.seeded = true;
                return;
            }
            if self.current_count >= record.steps {
                return;
            }
        }
        self.date = record.date;
        self.current_count = record.steps;
        self.hourly_steps = record.hourly_data;
        self.last_source = record.source;
        self.seeded = true;
    }

    pub fn begin_session(&mut self, session_id: String, started_at: DateTime<Utc>) {
        self.status = TrackingStatus::Tracking;
        self.session_id = Some(session_id);
        self.tracking_start_time = Some(started_at);
        self.session_baseline = self.current_count;
    }

    pub fn stop(&mut self) {
        self.status = TrackingStatus::Stopped;
        self.session_id = None;
    }

    pub fn belongs_to(&self, session_id: &str) -> bool {
        self.is_tracking() && self.session_id.as_deref() == Some(session_id)
    }

    pub fn record_step(&mut self, hour: usize) {
        self.add_steps(1, hour, StepSource::Device);
    }

    pub fn add_steps(&mut self, steps: u64, hour: usize, source: StepSource) {
        self.current_count = self.current_count.saturating_add(steps);
        let slot = hour.min(HOURS_PER_DAY - 1);
        self.hourly_steps[slot] = self.hourly_steps[slot].saturating_add(steps);
        self.last_source = source;
    }

    /// Explicit reset: the only way the day's count goes down.
    pub fn reset_counts(&mut self) {
        self.current_count = 0;
        self.hourly_steps = [0; HOURS_PER_DAY];
        self.session_baseline = 0;
        self.last_source = StepSource::Manual;
        self.seeded = true;
    }

    /// Move the counter to `today` if the day changed. The previous day's
    /// counts are kept in `closed_days` until the next flush writes them.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if today <= self.date {
            return false;
        }
        if self.seeded || self.current_count > 0 {
            self.closed_days.push(ClosedDay {
                date: self.date,
                steps: self.current_count,
                hourly_steps: self.hourly_steps,
                source: self.last_source,
                seeded: self.seeded,
            });
        }
        self.date = today;
        self.current_count = 0;
        self.hourly_steps = [0; HOURS_PER_DAY];
        self.session_baseline = 0;
        self.seeded = false;
        true
    }

    pub fn take_closed_days(&mut self) -> Vec<ClosedDay> {
        std::mem::take(&mut self.closed_days)
    }

    pub fn session_steps(&self) -> u64 {
        self.current_count.saturating_sub(self.session_baseline)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> TrackingStats {
        let elapsed_secs = match (self.is_tracking(), self.tracking_start_time) {
            (true, Some(started)) => (now - started).num_seconds().max(0) as u64,
            _ => 0,
        };
        let session_steps = if self.tracking_start_time.is_some() {
            self.session_steps()
        } else {
            0
        };
        let steps_per_minute = if elapsed_secs > 0 {
            session_steps as f64 * 60.0 / elapsed_secs as f64
        } else {
            0.0
        };

        TrackingStats {
            is_tracking: self.is_tracking(),
            tracking_start_time: self.tracking_start_time,
            date: self.date,
            current_count: self.current_count,
            session_steps,
            elapsed_secs,
            steps_per_minute,
            hourly_steps: self.hourly_steps,
        }
    }
}
