pub mod goal;
pub mod rollup;
pub mod step_record;

pub use goal::{Goal, GoalPatch, DEFAULT_DAILY_GOAL};
pub use rollup::{MonthRollup, WeekBreakdown, WeekRollup};
pub use step_record::{DerivedMetrics, HourlySteps, StepRecord, StepSource, HOURS_PER_DAY};
