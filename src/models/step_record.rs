//! Per-day step record and the fixed formulas for its derived fields.
//!
//! A `StepRecord` is keyed by calendar date. `goal` is a snapshot of the daily
//! goal taken when the record was written and is never rewritten afterwards.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const HOURS_PER_DAY: usize = 24;

/// Fixed-length hour-of-day histogram.
pub type HourlySteps = [u64; HOURS_PER_DAY];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepSource {
    Manual,
    #[default]
    Device,
    HealthApp,
    Estimated,
}

impl StepSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepSource::Manual => "manual",
            StepSource::Device => "device",
            StepSource::HealthApp => "health_app",
            StepSource::Estimated => "estimated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(StepSource::Manual),
            "device" => Some(StepSource::Device),
            "health_app" => Some(StepSource::HealthApp),
            "estimated" => Some(StepSource::Estimated),
            _ => None,
        }
    }
}

/// Derived metrics, recomputed from `steps` on every write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedMetrics {
    pub calories: u64,
    /// Kilometres, rounded to two decimals.
    pub distance: f64,
    pub active_minutes: u64,
}

impl DerivedMetrics {
    /// `calories = floor(steps * 0.04)`, `distance = round(steps * 0.0008, 2dp)`,
    /// `active_minutes = floor(steps / 100)`, in integer arithmetic.
    pub fn from_steps(steps: u64) -> Self {
        let distance_hundredths = (steps.saturating_mul(8).saturating_add(50)) / 100;
        Self {
            calories: steps.saturating_mul(4) / 100,
            distance: distance_hundredths as f64 / 100.0,
            active_minutes: steps / 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub date: NaiveDate,
    pub steps: u64,
    pub goal: u64,
    pub calories: u64,
    pub distance: f64,
    pub active_minutes: u64,
    pub hourly_data: HourlySteps,
    pub source: StepSource,
    pub last_updated: DateTime<Utc>,
    pub is_real_time: bool,
}

impl StepRecord {
    /// Zero-value record used when neither storage tier has the date.
    pub fn empty(date: NaiveDate, goal: u64) -> Self {
        Self {
            date,
            steps: 0,
            goal,
            calories: 0,
            distance: 0.0,
            active_minutes: 0,
            hourly_data: [0; HOURS_PER_DAY],
            source: StepSource::Device,
            last_updated: Utc::now(),
            is_real_time: false,
        }
    }

    pub fn with_steps(
        date: NaiveDate,
        steps: u64,
        hourly_data: HourlySteps,
        goal: u64,
        source: StepSource,
    ) -> Self {
        let mut record = Self {
            date,
            steps,
            goal,
            calories: 0,
            distance: 0.0,
            active_minutes: 0,
            hourly_data,
            source,
            last_updated: Utc::now(),
            is_real_time: false,
        };
        record.recompute_derived();
        record
    }

    pub fn recompute_derived(&mut self) {
        let metrics = DerivedMetrics::from_steps(self.steps);
        self.calories = metrics.calories;
        self.distance = metrics.distance;
        self.active_minutes = metrics.active_minutes;
    }

    pub fn hourly_total(&self) -> u64 {
        self.hourly_data.iter().sum()
    }

    /// Fraction of the snapshot goal reached, capped at 1.0.
    pub fn goal_progress(&self) -> f64 {
        if self.goal == 0 {
            return 0.0;
        }
        (self.steps as f64 / self.goal as f64).min(1.0)
    }

    pub fn goal_reached(&self) -> bool {
        self.goal > 0 && self.steps >= self.goal
    }
}
