pub mod controller;
mod sensing;
pub mod state;

pub use controller::{NoopObserver, TrackingConfig, TrackingController, TrackingObserver};
pub use state::{ClosedDay, TrackingState, TrackingStats, TrackingStatus};
