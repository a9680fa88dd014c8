use std::sync::Arc;

use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::StepSyncResult,
    motion::{AccelSample, MotionProcessor, SampleCallback, SensorSource},
};

use super::TrackingState;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Owns the sensor subscription and the loop that turns samples into steps.
pub struct SensingController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SensingController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Subscribe to the sensor and start attributing detected steps to
    /// `session_id`. The sensor callback only forwards samples into a channel,
    /// so it never blocks the platform's delivery thread.
    pub fn start_sensing(
        &mut self,
        session_id: String,
        sensor: &dyn SensorSource,
        state: Arc<Mutex<TrackingState>>,
        processor: Arc<Mutex<MotionProcessor>>,
    ) -> StepSyncResult<()> {
        if let Some(token) = self.cancel_token.take() {
            log_warn!("sensing loop already active; replacing it");
            token.cancel();
            self.handle.take();
        }

        let (sample_tx, sample_rx) = mpsc::unbounded_channel::<AccelSample>();
        let callback: SampleCallback = Arc::new(move |sample| {
            // receiver is gone once the loop has shut down
            let _ = sample_tx.send(sample);
        });
        sensor.subscribe(callback)?;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sensing_loop(
            session_id,
            sample_rx,
            state,
            processor,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Unsubscribe, cancel the loop and wait for it to exit.
    pub async fn stop_sensing(&mut self, sensor: &dyn SensorSource) {
        sensor.unsubscribe();

        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                log_error!("sensing loop task failed to join: {err}");
            }
        }
    }
}

impl Default for SensingController {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one sample through the detector and count the step if the session is
/// still the live one. Returns true when a step was counted.
pub async fn apply_sample(
    state: &Mutex<TrackingState>,
    processor: &Mutex<MotionProcessor>,
    session_id: &str,
    sample: &AccelSample,
) -> bool {
    let Some(event) = processor.lock().await.process_sample(sample) else {
        return false;
    };

    let mut guard = state.lock().await;
    if !guard.belongs_to(session_id) {
        log_debug!("dropping step detected after session {session_id} ended");
        return false;
    }
    let day = event.timestamp.date_naive();
    if day < guard.date {
        log_debug!("dropping step dated {day} while counting {}", guard.date);
        return false;
    }
    if guard.roll_over(day) {
        log_info!("first step of {day}; previous day kept for the next flush");
    }
    guard.record_step(event.hour);
    true
}

async fn sensing_loop(
    session_id: String,
    mut samples: mpsc::UnboundedReceiver<AccelSample>,
    state: Arc<Mutex<TrackingState>>,
    processor: Arc<Mutex<MotionProcessor>>,
    cancel_token: CancellationToken,
) {
    let mut counted: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                break;
            }
            next = samples.recv() => {
                match next {
                    Some(sample) => {
                        if apply_sample(&state, &processor, &session_id, &sample).await {
                            counted += 1;
                        }
                    }
                    None => {
                        log_debug!("sensor channel closed for session {session_id}");
                        break;
                    }
                }
            }
        }
    }
    log_info!("sensing loop for session {session_id} shutting down after {counted} steps");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::SimulatedSensor;
    use chrono::{Local, TimeZone};
    use std::time::Duration;

    fn state_for_today() -> Arc<Mutex<TrackingState>> {
        Arc::new(Mutex::new(TrackingState::for_date(Local::now().date_naive())))
    }

    #[tokio::test]
    async fn samples_outside_the_session_are_dropped() {
        let state = state_for_today();
        let processor = Mutex::new(MotionProcessor::default());
        state.lock().await.begin_session("live".into(), chrono::Utc::now());

        apply_sample(&state, &processor, "stale", &AccelSample::new(0.0, 0.0, 1.0)).await;
        assert!(!apply_sample(&state, &processor, "stale", &AccelSample::new(0.0, 0.0, 1.6)).await);
        assert_eq!(state.lock().await.current_count, 0);

        apply_sample(&state, &processor, "live", &AccelSample::new(0.0, 0.0, 1.0)).await;
        assert!(apply_sample(&state, &processor, "live", &AccelSample::new(0.0, 0.0, 1.6)).await);
        assert_eq!(state.lock().await.current_count, 1);
    }

    #[tokio::test]
    async fn samples_from_an_earlier_day_are_dropped() {
        let state = state_for_today();
        let processor = Mutex::new(MotionProcessor::default());
        state.lock().await.begin_session("live".into(), chrono::Utc::now());

        let long_ago = Local.with_ymd_and_hms(2001, 1, 1, 12, 0, 0).unwrap();
        apply_sample(&state, &processor, "live", &AccelSample::at(0.0, 0.0, 1.0, long_ago)).await;
        assert!(!apply_sample(&state, &processor, "live", &AccelSample::at(0.0, 0.0, 1.6, long_ago)).await);
        assert_eq!(state.lock().await.current_count, 0);
    }

    #[tokio::test]
    async fn steps_after_midnight_roll_the_counter_over() {
        let yesterday = Local::now().date_naive().pred_opt().unwrap();
        let state = Arc::new(Mutex::new(TrackingState::for_date(yesterday)));
        let processor = Mutex::new(MotionProcessor::default());
        {
            let mut guard = state.lock().await;
            guard.seeded = true;
            guard.add_steps(4_000, 22, crate::models::StepSource::Device);
            guard.begin_session("live".into(), chrono::Utc::now());
        }

        let mut counted = 0;
        for _ in 0..10 {
            apply_sample(&state, &processor, "live", &AccelSample::new(0.0, 0.0, 1.0)).await;
            if apply_sample(&state, &processor, "live", &AccelSample::new(0.0, 0.0, 1.6)).await {
                counted += 1;
            }
        }
        assert_eq!(counted, 10);

        let mut guard = state.lock().await;
        assert_eq!(guard.date, Local::now().date_naive());
        assert_eq!(guard.current_count, 10);
        assert!(guard.belongs_to("live"));
        let closed = guard.take_closed_days();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].date, yesterday);
        assert_eq!(closed[0].steps, 4_000);
    }

    #[tokio::test]
    async fn pushed_samples_flow_through_the_loop() {
        let sensor = SimulatedSensor::manual();
        let state = state_for_today();
        let processor = Arc::new(Mutex::new(MotionProcessor::default()));
        state.lock().await.begin_session("s".into(), chrono::Utc::now());

        let mut sensing = SensingController::new();
        sensing
            .start_sensing("s".into(), &sensor, state.clone(), processor)
            .unwrap();
        assert!(sensing.is_active());

        for z in [1.0, 1.6, 1.0, 1.6, 1.0, 1.6] {
            assert!(sensor.push(AccelSample::new(0.0, 0.0, z)));
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while state.lock().await.current_count < 3 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(state.lock().await.current_count, 3);

        sensing.stop_sensing(&sensor).await;
        assert!(!sensing.is_active());
        assert!(!sensor.is_subscribed());
    }
}
