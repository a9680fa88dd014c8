use serde::{Deserialize, Serialize};

use crate::error::StepSyncError;

pub const DEFAULT_DAILY_GOAL: u64 = 10_000;
pub const DEFAULT_WEEKLY_GOAL: u64 = 70_000;
pub const DEFAULT_MONTHLY_GOAL: u64 = 300_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub daily: u64,
    pub weekly: u64,
    pub monthly: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<u64>,
}

impl Default for Goal {
    fn default() -> Self {
        Self {
            daily: DEFAULT_DAILY_GOAL,
            weekly: DEFAULT_WEEKLY_GOAL,
            monthly: DEFAULT_MONTHLY_GOAL,
            custom: None,
        }
    }
}

impl Goal {
    pub fn validate(&self) -> Result<(), StepSyncError> {
        let fields = [
            ("daily", Some(self.daily)),
            ("weekly", Some(self.weekly)),
            ("monthly", Some(self.monthly)),
            ("custom", self.custom),
        ];
        for (name, value) in fields {
            if value == Some(0) {
                return Err(StepSyncError::InvalidGoal(format!(
                    "{name} goal must be positive"
                )));
            }
        }
        Ok(())
    }

    pub fn apply(&self, patch: &GoalPatch) -> Goal {
        Goal {
            daily: patch.daily.unwrap_or(self.daily),
            weekly: patch.weekly.unwrap_or(self.weekly),
            monthly: patch.monthly.unwrap_or(self.monthly),
            custom: match patch.custom {
                Some(custom) => custom,
                None => self.custom,
            },
        }
    }
}

/// Partial goal update. `custom: Some(None)` clears the custom goal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPatch {
    pub daily: Option<u64>,
    pub weekly: Option<u64>,
    pub monthly: Option<u64>,
    #[serde(default)]
    pub custom: Option<Option<u64>>,
}

impl GoalPatch {
    pub fn daily(daily: u64) -> Self {
        Self {
            daily: Some(daily),
            ..Self::default()
        }
    }
}
