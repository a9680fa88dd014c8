pub mod detector;
pub mod sensor;

pub use detector::{AccelSample, DetectorConfig, MotionProcessor, StepEvent};
pub use sensor::{SampleCallback, SensorSource, SimulatedSensor, UnavailableSensor, WalkingPattern};
