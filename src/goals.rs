//! Goal configuration store. Lives apart from the daily records: records copy
//! the daily goal when written, so changing it here never touches history.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::Context;

use crate::{
    error::{StepSyncError, StepSyncResult},
    log_info, log_warn,
    models::{Goal, GoalPatch},
};

const ENABLE_LOGS: bool = true;

pub struct GoalStore {
    path: Option<PathBuf>,
    data: RwLock<Goal>,
}

impl GoalStore {
    /// Load goals from `path`, seeding and persisting the defaults when the
    /// file is missing or unreadable.
    pub fn new(path: PathBuf) -> StepSyncResult<Self> {
        let goal = match load(&path) {
            Ok(goal) => goal,
            Err(StepSyncError::ConfigMissing) => {
                log_info!("No stored goals at {}; seeding defaults", path.display());
                let goal = Goal::default();
                persist(&path, &goal)?;
                goal
            }
            Err(err) => {
                log_warn!("Ignoring unreadable goals at {}: {err}", path.display());
                Goal::default()
            }
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(goal),
        })
    }

    /// Store that never touches disk.
    pub fn in_memory(goal: Goal) -> Self {
        Self {
            path: None,
            data: RwLock::new(goal),
        }
    }

    pub fn current(&self) -> Goal {
        *self.read()
    }

    pub fn daily(&self) -> u64 {
        self.read().daily
    }

    pub fn update(&self, patch: &GoalPatch) -> StepSyncResult<Goal> {
        let mut guard = self.write();
        let updated = guard.apply(patch);
        updated.validate()?;
        if let Some(path) = &self.path {
            persist(path, &updated)?;
        }
        *guard = updated;
        Ok(updated)
    }

    /// Drop stored goals and fall back to defaults.
    pub fn reset(&self) -> StepSyncResult<Goal> {
        let mut guard = self.write();
        let goal = Goal::default();
        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove goals at {}", path.display()))?;
            }
        }
        *guard = goal;
        Ok(goal)
    }

    fn read(&self) -> RwLockReadGuard<'_, Goal> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Goal> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn load(path: &Path) -> StepSyncResult<Goal> {
    if !path.exists() {
        return Err(StepSyncError::ConfigMissing);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read goals from {}", path.display()))?;
    let goal: Goal = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse goals from {}", path.display()))?;
    goal.validate()?;
    Ok(goal)
}

fn persist(path: &Path, goal: &Goal) -> StepSyncResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let serialized = serde_json::to_string_pretty(goal).context("Failed to encode goals")?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write goals to {}", path.display()))?;
    Ok(())
}
