use thiserror::Error;

/// Failure taxonomy of the step subsystem. None of these are fatal: the
/// façade absorbs each one and degrades to stale or default data.
#[derive(Debug, Error)]
pub enum StepSyncError {
    /// No platform motion sensor; tracking stays stopped, manual input still works.
    #[error("motion sensor unavailable on this device")]
    SensorUnavailable,

    #[error("remote write failed: {0}")]
    RemoteWriteFailure(String),

    #[error("remote read failed: {0}")]
    RemoteReadFailure(String),

    /// No stored goal; callers seed the default.
    #[error("no goal configuration stored")]
    ConfigMissing,

    #[error("invalid goal: {0}")]
    InvalidGoal(String),

    #[error("invalid date range")]
    InvalidDateRange,

    #[error("health app sync failed: {0}")]
    HealthSync(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type StepSyncResult<T> = Result<T, StepSyncError>;
