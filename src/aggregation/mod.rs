//! Weekly and monthly rollups over daily records.
//!
//! The two levels average differently. A week always divides by 7, however
//! many days were found. A month divides by the number of records fetched,
//! and its weekly breakdown divides each chunk by the chunk's own length.

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{MonthRollup, StepRecord, WeekBreakdown, WeekRollup};

pub mod synthesis;

pub use synthesis::{synthesize_hourly, synthesize_hourly_with, PEAK_HOURS};

/// Days with more steps than this count as active.
pub const ACTIVE_DAY_THRESHOLD: u64 = 1_000;
pub const DAYS_PER_WEEK: usize = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Totals {
    steps: u64,
    days_active: u32,
    calories: u64,
    distance: f64,
}

fn totals(records: &[StepRecord]) -> Totals {
    records.iter().fold(Totals::default(), |mut acc, record| {
        acc.steps += record.steps;
        acc.calories += record.calories;
        acc.distance += record.distance;
        if record.steps > ACTIVE_DAY_THRESHOLD {
            acc.days_active += 1;
        }
        acc
    })
}

fn round_km(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn floor_div(total: u64, divisor: usize) -> u64 {
    if divisor == 0 {
        0
    } else {
        total / divisor as u64
    }
}

pub fn week_end(week_start: NaiveDate) -> NaiveDate {
    week_start + Duration::days(DAYS_PER_WEEK as i64 - 1)
}

/// First and last calendar day of `year`-`month`, or `None` for an invalid month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next_first.pred_opt()?))
}

pub fn weekly_rollup(week_start: NaiveDate, records: &[StepRecord]) -> WeekRollup {
    let mut days = records.to_vec();
    days.sort_by_key(|record| record.date);

    let sums = totals(&days);
    WeekRollup {
        week_start,
        week_end: week_end(week_start),
        total_steps: sums.steps,
        average_steps: floor_div(sums.steps, DAYS_PER_WEEK),
        days_active: sums.days_active,
        total_calories: sums.calories,
        total_distance: round_km(sums.distance),
        days,
    }
}

pub fn monthly_rollup(year: i32, month: u32, records: &[StepRecord]) -> Option<MonthRollup> {
    let (first_day, last_day) = month_bounds(year, month)?;

    let mut days = records.to_vec();
    days.sort_by_key(|record| record.date);

    let sums = totals(&days);
    let weekly_breakdown = days
        .chunks(DAYS_PER_WEEK)
        .filter_map(|chunk| {
            let first = chunk.first()?;
            let last = chunk.last()?;
            let chunk_sums = totals(chunk);
            Some(WeekBreakdown {
                start_date: first.date,
                end_date: last.date,
                days: chunk.len() as u32,
                total_steps: chunk_sums.steps,
                average_steps: floor_div(chunk_sums.steps, chunk.len()),
                days_active: chunk_sums.days_active,
                total_calories: chunk_sums.calories,
                total_distance: round_km(chunk_sums.distance),
            })
        })
        .collect();

    Some(MonthRollup {
        year,
        month,
        first_day,
        last_day,
        total_steps: sums.steps,
        average_steps: floor_div(sums.steps, days.len()),
        days_active: sums.days_active,
        days_recorded: days.len() as u32,
        total_calories: sums.calories,
        total_distance: round_km(sums.distance),
        weekly_breakdown,
        days,
    })
}

/// Copy of `days` with `record` replacing the entry for its date (or
/// inserted in date order).
pub fn merge_record(days: &[StepRecord], record: &StepRecord) -> Vec<StepRecord> {
    let mut merged: Vec<StepRecord> = days
        .iter()
        .filter(|existing| existing.date != record.date)
        .cloned()
        .collect();
    merged.push(record.clone());
    merged.sort_by_key(|r| r.date);
    merged
}

/// Recompute a held week with one day's record swapped in.
pub fn refresh_week(rollup: &WeekRollup, record: &StepRecord) -> WeekRollup {
    weekly_rollup(rollup.week_start, &merge_record(&rollup.days, record))
}

/// Recompute a held month with one day's record swapped in.
pub fn refresh_month(rollup: &MonthRollup, record: &StepRecord) -> Option<MonthRollup> {
    monthly_rollup(rollup.year, rollup.month, &merge_record(&rollup.days, record))
}

/// Monday of the week containing `date`.
pub fn week_start_for(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}
