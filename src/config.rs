//! Runtime configuration, read from `STEPSYNC_*` environment variables.

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::{log_warn, motion::DetectorConfig, tracking::TrackingConfig};

const ENABLE_LOGS: bool = true;

const DEFAULT_DATA_DIR: &str = "./stepsync-data";
const DEFAULT_USER_ID: &str = "local-user";

#[derive(Debug, Clone)]
pub struct StepSyncConfig {
    pub data_dir: PathBuf,
    pub user_id: String,
    pub tracking: TrackingConfig,
    pub detector: DetectorConfig,
    pub debug: bool,
}

impl Default for StepSyncConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            user_id: DEFAULT_USER_ID.to_string(),
            tracking: TrackingConfig::default(),
            detector: DetectorConfig::default(),
            debug: false,
        }
    }
}

impl StepSyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("STEPSYNC_DATA_DIR").filter(|v| !v.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(user) = lookup("STEPSYNC_USER_ID").filter(|v| !v.is_empty()) {
            config.user_id = user;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "STEPSYNC_FLUSH_INTERVAL_SECS") {
            if secs == 0 {
                log_warn!("STEPSYNC_FLUSH_INTERVAL_SECS must be positive; keeping default");
            } else {
                config.tracking.flush_interval = Duration::from_secs(secs);
            }
        }
        if let Some(threshold) = parse_var::<f64>(&lookup, "STEPSYNC_STEP_THRESHOLD") {
            config.detector.step_threshold = threshold;
        }
        if let Some(floor) = parse_var::<f64>(&lookup, "STEPSYNC_MIN_MAGNITUDE") {
            config.detector.min_magnitude = floor;
        }
        config.debug = lookup("STEPSYNC_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        config
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("stepsync.sqlite3")
    }

    pub fn goals_path(&self) -> PathBuf {
        self.data_dir.join("goals.json")
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log_warn!("ignoring unparsable {key}={raw}");
            None
        }
    }
}
