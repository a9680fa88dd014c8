//! Reconstructs a plausible 24-slot histogram for a day whose per-hour data
//! is unknown (the remote tier only keeps the daily total).
//!
//! The result is random on purpose. Every slot is non-negative, the sum never
//! exceeds the total, and a remainder that was never scattered is dropped, so
//! the sum is only close to the total.

use rand::Rng;

use crate::models::{HourlySteps, HOURS_PER_DAY};

pub const PEAK_HOURS: [usize; 6] = [7, 8, 12, 17, 18, 19];

const PEAK_SHARE_MIN: f64 = 0.10;
const PEAK_SHARE_MAX: f64 = 0.25;
const SCATTER_SHARE_MIN: f64 = 0.85;

fn is_quiet_hour(hour: usize) -> bool {
    hour < 6 || hour >= 22
}

pub fn synthesize_hourly(steps: u64) -> HourlySteps {
    synthesize_hourly_with(steps, &mut rand::thread_rng())
}

pub fn synthesize_hourly_with<R: Rng + ?Sized>(steps: u64, rng: &mut R) -> HourlySteps {
    let mut hourly = [0u64; HOURS_PER_DAY];
    if steps == 0 {
        return hourly;
    }

    let mut remaining = steps;
    for &hour in &PEAK_HOURS {
        let share = rng.gen_range(PEAK_SHARE_MIN..=PEAK_SHARE_MAX);
        let allocated = ((remaining as f64) * share).floor() as u64;
        let allocated = allocated.min(remaining);
        hourly[hour] = allocated;
        remaining -= allocated;
    }

    let scatter_budget =
        ((remaining as f64) * rng.gen_range(SCATTER_SHARE_MIN..=1.0)).floor() as u64;
    let weights: Vec<(usize, f64)> = (0..HOURS_PER_DAY)
        .filter(|hour| !PEAK_HOURS.contains(hour))
        .map(|hour| {
            let weight = if is_quiet_hour(hour) {
                rng.gen_range(0.0..0.2)
            } else {
                rng.gen_range(0.5..1.5)
            };
            (hour, weight)
        })
        .collect();
    let total_weight: f64 = weights.iter().map(|(_, w)| w).sum();

    if total_weight > 0.0 {
        for (hour, weight) in weights {
            let share = ((scatter_budget as f64) * weight / total_weight).floor() as u64;
            hourly[hour] = share;
        }
    }

    hourly
}
