//! Sensor capability consumed by the tracking controller, plus the adapters
//! shipped with the crate. Platform adapters live outside the crate and only
//! need to implement [`SensorSource`].

use std::{
    f64::consts::PI,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{StepSyncError, StepSyncResult},
    log_debug, log_warn,
};

const ENABLE_LOGS: bool = true;

use super::AccelSample;

pub type SampleCallback = Arc<dyn Fn(AccelSample) + Send + Sync>;

pub trait SensorSource: Send + Sync {
    fn is_available(&self) -> bool;

    /// Start delivering samples to `callback`. Replaces any earlier subscriber.
    fn subscribe(&self, callback: SampleCallback) -> StepSyncResult<()>;

    fn unsubscribe(&self);
}

/// Device without an accelerometer.
#[derive(Debug, Default)]
pub struct UnavailableSensor;

impl SensorSource for UnavailableSensor {
    fn is_available(&self) -> bool {
        false
    }

    fn subscribe(&self, _callback: SampleCallback) -> StepSyncResult<()> {
        Err(StepSyncError::SensorUnavailable)
    }

    fn unsubscribe(&self) {}
}

/// Sine-shaped walking signal around 1 g.
#[derive(Debug, Clone, Copy)]
pub struct WalkingPattern {
    pub sample_rate_hz: f64,
    pub cadence_hz: f64,
    pub amplitude: f64,
}

impl Default for WalkingPattern {
    fn default() -> Self {
        Self {
            sample_rate_hz: 10.0,
            cadence_hz: 2.0,
            amplitude: 0.6,
        }
    }
}

impl WalkingPattern {
    pub fn sample_at(&self, index: u64) -> AccelSample {
        let t = index as f64 / self.sample_rate_hz;
        let magnitude = 1.0 + self.amplitude * (2.0 * PI * self.cadence_hz * t).sin();
        AccelSample::new(0.0, 0.0, magnitude)
    }
}

/// Test and demo sensor. Samples are pushed by hand, and optionally generated
/// from a [`WalkingPattern`] while subscribed.
pub struct SimulatedSensor {
    pattern: Option<WalkingPattern>,
    callback: Mutex<Option<SampleCallback>>,
    generator: Mutex<Option<CancellationToken>>,
}

impl SimulatedSensor {
    pub fn manual() -> Self {
        Self {
            pattern: None,
            callback: Mutex::new(None),
            generator: Mutex::new(None),
        }
    }

    pub fn walking(pattern: WalkingPattern) -> Self {
        Self {
            pattern: Some(pattern),
            ..Self::manual()
        }
    }

    /// Deliver one sample to the current subscriber. Returns false when
    /// nobody is subscribed.
    pub fn push(&self, sample: AccelSample) -> bool {
        let callback = lock(&self.callback).clone();
        match callback {
            Some(callback) => {
                callback(sample);
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.callback).is_some()
    }

    fn spawn_generator(&self, pattern: WalkingPattern, callback: SampleCallback) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log_warn!("simulated sensor has no runtime; walking samples disabled");
            return;
        };

        let token = CancellationToken::new();
        let child = token.clone();
        if let Some(previous) = lock(&self.generator).replace(token) {
            previous.cancel();
        }

        let period = Duration::from_secs_f64(1.0 / pattern.sample_rate_hz.max(1.0));
        handle.spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut index: u64 = 0;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        callback(pattern.sample_at(index));
                        index = index.wrapping_add(1);
                    }
                    _ = child.cancelled() => {
                        log_debug!("simulated walking generator stopped after {index} samples");
                        break;
                    }
                }
            }
        });
    }
}

impl SensorSource for SimulatedSensor {
    fn is_available(&self) -> bool {
        true
    }

    fn subscribe(&self, callback: SampleCallback) -> StepSyncResult<()> {
        *lock(&self.callback) = Some(callback.clone());
        if let Some(pattern) = self.pattern {
            self.spawn_generator(pattern, callback);
        }
        Ok(())
    }

    fn unsubscribe(&self) {
        lock(&self.callback).take();
        if let Some(token) = lock(&self.generator).take() {
            token.cancel();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
