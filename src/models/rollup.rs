//! Weekly and monthly summaries. Derived on query, never persisted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::StepRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeekRollup {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub total_steps: u64,
    pub average_steps: u64,
    pub days_active: u32,
    pub total_calories: u64,
    pub total_distance: f64,
    /// Records actually found in the window, ordered by date.
    pub days: Vec<StepRecord>,
}

impl WeekRollup {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.week_start && date <= self.week_end
    }

    /// Summary only, for logging.
    pub fn without_days(&self) -> Self {
        Self {
            days: Vec::new(),
            ..self.clone()
        }
    }
}

/// One sequential chunk of a month's fetched records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeekBreakdown {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: u32,
    pub total_steps: u64,
    pub average_steps: u64,
    pub days_active: u32,
    pub total_calories: u64,
    pub total_distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthRollup {
    pub year: i32,
    pub month: u32,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub total_steps: u64,
    pub average_steps: u64,
    pub days_active: u32,
    pub days_recorded: u32,
    pub total_calories: u64,
    pub total_distance: f64,
    pub weekly_breakdown: Vec<WeekBreakdown>,
    pub days: Vec<StepRecord>,
}

impl MonthRollup {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first_day && date <= self.last_day
    }

    pub fn without_days(&self) -> Self {
        Self {
            days: Vec::new(),
            ..self.clone()
        }
    }
}
