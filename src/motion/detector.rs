//! Threshold-crossing step detector.
//!
//! A step fires when the change in acceleration magnitude between two
//! consecutive samples exceeds `step_threshold` and the current magnitude is
//! above `min_magnitude`. There is no refractory window, so two qualifying
//! transitions inside one footstep's oscillation both count.

use chrono::{DateTime, Local, Timelike};
use serde::{Deserialize, Serialize};

/// Configuration for step detection. Magnitudes are in g.
#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// Minimum |a - a_prev| for a transition to count as a step.
    pub step_threshold: f64,
    /// Readings at or below this are treated as gravity-only.
    pub min_magnitude: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            step_threshold: 0.25,
            min_magnitude: 1.1,
        }
    }
}

/// One 3-axis accelerometer reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: DateTime<Local>,
}

impl AccelSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self::at(x, y, z, Local::now())
    }

    pub fn at(x: f64, y: f64, z: f64, timestamp: DateTime<Local>) -> Self {
        Self { x, y, z, timestamp }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2) + self.z.powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEvent {
    pub timestamp: DateTime<Local>,
    /// Hour-of-day slot the step is attributed to.
    pub hour: usize,
    pub magnitude: f64,
}

#[derive(Debug)]
pub struct MotionProcessor {
    config: DetectorConfig,
    prev_magnitude: Option<f64>,
    total_steps: u64,
}

impl MotionProcessor {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            prev_magnitude: None,
            total_steps: 0,
        }
    }

    /// Feed one sample. The first sample after construction or `reset` only
    /// primes the previous magnitude.
    pub fn process_sample(&mut self, sample: &AccelSample) -> Option<StepEvent> {
        let magnitude = sample.magnitude();
        let previous = self.prev_magnitude.replace(magnitude)?;

        let delta = (magnitude - previous).abs();
        if delta > self.config.step_threshold && magnitude > self.config.min_magnitude {
            self.total_steps += 1;
            Some(StepEvent {
                timestamp: sample.timestamp,
                hour: sample.timestamp.hour() as usize,
                magnitude,
            })
        } else {
            None
        }
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn reset(&mut self) {
        self.prev_magnitude = None;
        self.total_steps = 0;
    }
}

impl Default for MotionProcessor {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}
