//! The [PlaybackSupervisor] drives one guidance cycle per video frame and
//! owns the only mutable state in the engine.
//!
//! For every frame it:
//!
//! - polls the rangefinder, for logging only;
//! - counts frames without a detection and silences everything once
//!   `miss_limit` of them pile up;
//! - classifies the detection and leaves the current sound alone if the
//!   state is unchanged;
//! - otherwise starts the new sound and retires the old one.
//!
//! [Classification::Track] is never left alone. Its beep rate follows the
//! continuously changing distance, so it is re-synthesized every frame.
//!
//! A new sound is started before the old one is stopped, with a short grace
//! delay between the two. The brief overlap avoids an audible gap. Since the
//! delay is slept on the calling thread, handovers never interleave.

use crate::config::GuidanceConfig;
use crate::playback::{AudioOutput, PlaybackTask};
use crate::position_classifier::{Classification, PositionClassifier, TargetPosition};
use crate::range_sensor::{Millimeters, RangeSensor};
use crate::tone_synthesizer::{ToneLoop, ToneSynthesizer};

use log::{debug, error, info, warn};
use std::{fmt, sync::Arc, time::Duration};

/// What a single call to [PlaybackSupervisor::run_cycle] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new sound was started and the previous one, if any, retired
    Handover {
        /// The state now playing
        classification: Classification,
        /// Id of the newly spawned [PlaybackTask]
        task_id: u64,
    },
    /// The state was unchanged, so the current sound keeps playing
    Retained(Classification),
    /// No target this frame, but not enough misses yet to go silent
    Missed {
        /// Consecutive misses so far
        miss_count: u32,
    },
    /// Too many consecutive misses, nothing is playing
    Silenced,
    /// The new sound could not be started. The previous sound, if any,
    /// keeps playing and the next frame will try again.
    HandoverFailed(Classification),
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Handover {
                classification,
                task_id,
            } => write!(f, "playing {} as task {}", classification, task_id),
            CycleOutcome::Retained(classification) => {
                write!(f, "still {}, continuing last audio", classification)
            }
            CycleOutcome::Missed { miss_count } => {
                write!(f, "no target, miss count is now {}", miss_count)
            }
            CycleOutcome::Silenced => write!(f, "no target for too long, silent"),
            CycleOutcome::HandoverFailed(classification) => {
                write!(f, "failed to start {}", classification)
            }
        }
    }
}

/// The supervisor's bookkeeping. Only the supervisor's own thread touches it.
#[derive(Debug, Default)]
struct PlaybackState {
    active: Option<PlaybackTask>,
    classification: Classification,
    miss_count: u32,
}

/// Turns a stream of detections into a single, continuously replaced,
/// guidance sound.
pub struct PlaybackSupervisor<S: RangeSensor> {
    classifier: PositionClassifier,
    synthesizer: ToneSynthesizer,
    output: Arc<dyn AudioOutput>,
    sensor: S,
    grace: Duration,
    miss_limit: u32,
    state: PlaybackState,
    next_task_id: u64,
    last_range: Option<Millimeters>,
}

impl<S: RangeSensor> PlaybackSupervisor<S> {
    /// Builds an idle supervisor from an already validated config.
    pub fn new(config: &GuidanceConfig, sensor: S, output: Arc<dyn AudioOutput>) -> Self {
        Self {
            classifier: PositionClassifier::new(config),
            synthesizer: ToneSynthesizer::new(config),
            output,
            sensor,
            grace: Duration::from_secs_f64(config.handover_grace_secs),
            miss_limit: config.miss_limit,
            state: PlaybackState::default(),
            next_task_id: 0,
            last_range: None,
        }
    }

    /// The state currently sounding, [Classification::Idle] if none.
    pub fn active_classification(&self) -> Classification {
        self.state.classification
    }

    /// Consecutive frames without a detection.
    pub fn miss_count(&self) -> u32 {
        self.state.miss_count
    }

    /// The task playing the current sound, if any.
    pub fn active_task(&self) -> Option<&PlaybackTask> {
        self.state.active.as_ref()
    }

    /// The most recent rangefinder reading, `None` if the last read failed.
    pub fn last_range(&self) -> Option<Millimeters> {
        self.last_range
    }

    /// Runs one guidance cycle for one frame's detection.
    pub fn run_cycle(&mut self, detection: Option<TargetPosition>) -> CycleOutcome {
        self.poll_range();

        let outcome = match detection {
            None => self.on_miss(),
            Some(position) => self.on_detection(position),
        };
        debug!("Cycle: {}", outcome);
        outcome
    }

    /// Stops whatever is playing and returns to [Classification::Idle].
    pub fn shutdown(&mut self) {
        self.stop_active();
        self.state.classification = Classification::Idle;
    }

    fn poll_range(&mut self) {
        self.last_range = self.sensor.read_range().ok();
        match self.last_range {
            Some(range) => debug!("Current distance: {:.3} meters", range as f64 / 1000.0),
            None => debug!("Current distance: unknown"),
        }
    }

    fn on_miss(&mut self) -> CycleOutcome {
        self.state.miss_count = self.state.miss_count.saturating_add(1);

        if self.state.miss_count < self.miss_limit {
            info!(
                "No target detected, miss count is now {}",
                self.state.miss_count
            );
            return CycleOutcome::Missed {
                miss_count: self.state.miss_count,
            };
        }

        if self.state.miss_count == self.miss_limit {
            warn!(
                "No target within the last {} cycles, stopping all audio",
                self.miss_limit
            );
        }
        self.stop_active();
        self.state.classification = Classification::Idle;
        CycleOutcome::Silenced
    }

    fn on_detection(&mut self, position: TargetPosition) -> CycleOutcome {
        let (shaping, classification) = self.classifier.process(position);
        debug!("Target {} shaped to {:?}", position, shaping);

        if classification != Classification::Track
            && classification == self.state.classification
        {
            info!(
                "Target found {}, still {}, continuing last audio",
                position, classification
            );
            return CycleOutcome::Retained(classification);
        }

        info!("Target found {} - {}", position, classification);
        match self.synthesizer.synthesize(classification, &shaping) {
            Some(tone) => self.handover(classification, tone),
            None => {
                // Positions never classify as Idle, but stay silent if one does
                self.shutdown();
                CycleOutcome::Silenced
            }
        }
    }

    /// Starts `tone`, then retires the previous task after the grace delay.
    fn handover(&mut self, classification: Classification, tone: ToneLoop) -> CycleOutcome {
        let task_id = self.next_task_id;
        let task = match PlaybackTask::spawn(task_id, classification, self.output.clone(), tone) {
            Ok(task) => task,
            Err(e) => {
                error!("Could not start playback for {}: {}", classification, e);
                return CycleOutcome::HandoverFailed(classification);
            }
        };
        self.next_task_id += 1;

        if self.state.active.is_some() && !self.grace.is_zero() {
            spin_sleep::sleep(self.grace);
        }
        self.stop_active();

        self.state.active = Some(task);
        self.state.classification = classification;
        self.state.miss_count = 0;

        CycleOutcome::Handover {
            classification,
            task_id,
        }
    }

    /// Best-effort, non-blocking termination of the active task.
    fn stop_active(&mut self) {
        if let Some(task) = self.state.active.take() {
            if task.terminate() {
                debug!("Terminated playback-{}", task.id());
            } else {
                debug!("playback-{} had already finished", task.id());
            }
        }
    }
}

impl<S: RangeSensor> Drop for PlaybackSupervisor<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{CancelToken, OutputError, SilentOutput};
    use crate::range_sensor::{NoRangeSensor, RangeError};
    use std::sync::Mutex;

    /// An output that remembers what it was asked to play and then blocks
    /// until cancelled.
    #[derive(Default)]
    struct RecordingOutput {
        played: Mutex<Vec<u32>>,
    }

    impl AudioOutput for RecordingOutput {
        fn play(&self, tone: &ToneLoop, cancel: &CancelToken) -> Result<(), OutputError> {
            self.played.lock().unwrap().push(tone.descriptor().tone_hz);
            SilentOutput.play(tone, cancel)
        }

        fn name(&self) -> &'static str {
            "RecordingOutput"
        }
    }

    struct FixedRange(Millimeters);

    impl RangeSensor for FixedRange {
        fn read_range(&mut self) -> Result<Millimeters, RangeError> {
            Ok(self.0)
        }
    }

    fn config() -> GuidanceConfig {
        GuidanceConfig {
            handover_grace_secs: 0.0,
            ..GuidanceConfig::default()
        }
    }

    fn supervisor() -> PlaybackSupervisor<NoRangeSensor> {
        PlaybackSupervisor::new(&config(), NoRangeSensor, Arc::new(SilentOutput))
    }

    const WIDE_LEFT: TargetPosition = TargetPosition { x: 150, y: 70 };
    const BULLS: TargetPosition = TargetPosition { x: 320, y: 240 };
    const TRACK: TargetPosition = TargetPosition { x: 400, y: 240 };

    #[test]
    fn starts_idle() {
        let s = supervisor();
        assert_eq!(s.active_classification(), Classification::Idle);
        assert_eq!(s.miss_count(), 0);
        assert!(s.active_task().is_none());
        assert_eq!(s.last_range(), None);
    }

    #[test]
    fn same_state_is_not_replayed() {
        let mut s = supervisor();
        let first = s.run_cycle(Some(WIDE_LEFT));
        assert_eq!(
            first,
            CycleOutcome::Handover {
                classification: Classification::WideLeft,
                task_id: 0
            }
        );
        let token = s.active_task().unwrap().cancel_token();

        let second = s.run_cycle(Some(TargetPosition::new(100, 300)));
        assert_eq!(second, CycleOutcome::Retained(Classification::WideLeft));
        assert_eq!(s.active_task().unwrap().id(), 0);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn track_is_always_replayed() {
        let mut s = supervisor();
        assert!(matches!(
            s.run_cycle(Some(TRACK)),
            CycleOutcome::Handover {
                classification: Classification::Track,
                task_id: 0
            }
        ));
        let first = s.active_task().unwrap().cancel_token();

        assert!(matches!(
            s.run_cycle(Some(TRACK)),
            CycleOutcome::Handover {
                classification: Classification::Track,
                task_id: 1
            }
        ));
        assert!(first.is_cancelled());
        assert_eq!(s.active_task().unwrap().id(), 1);
    }

    #[test]
    fn state_change_retires_previous_task() {
        let mut s = supervisor();
        s.run_cycle(Some(WIDE_LEFT));
        let wide = s.active_task().unwrap().cancel_token();

        let outcome = s.run_cycle(Some(BULLS));
        assert_eq!(
            outcome,
            CycleOutcome::Handover {
                classification: Classification::Bulls,
                task_id: 1
            }
        );
        assert!(wide.is_cancelled());
        assert!(!s.active_task().unwrap().cancel_token().is_cancelled());
        assert_eq!(s.active_classification(), Classification::Bulls);
    }

    #[test]
    fn silence_comes_exactly_at_the_miss_limit() {
        let mut s = supervisor();
        s.run_cycle(Some(WIDE_LEFT));
        let token = s.active_task().unwrap().cancel_token();

        for miss in 1..10 {
            assert_eq!(
                s.run_cycle(None),
                CycleOutcome::Missed { miss_count: miss }
            );
            assert!(!token.is_cancelled());
            assert_eq!(s.active_classification(), Classification::WideLeft);
        }

        assert_eq!(s.run_cycle(None), CycleOutcome::Silenced);
        assert!(token.is_cancelled());
        assert!(s.active_task().is_none());
        assert_eq!(s.active_classification(), Classification::Idle);

        // Staying silent is idempotent
        assert_eq!(s.run_cycle(None), CycleOutcome::Silenced);
        assert_eq!(s.miss_count(), 11);
    }

    #[test]
    fn detection_after_silence_plays_again() {
        let mut s = supervisor();
        s.run_cycle(Some(WIDE_LEFT));
        for _ in 0..10 {
            s.run_cycle(None);
        }
        assert_eq!(s.active_classification(), Classification::Idle);

        assert!(matches!(
            s.run_cycle(Some(WIDE_LEFT)),
            CycleOutcome::Handover {
                classification: Classification::WideLeft,
                ..
            }
        ));
        assert_eq!(s.miss_count(), 0);
    }

    #[test]
    fn miss_count_survives_a_retained_cycle() {
        let mut s = supervisor();
        s.run_cycle(Some(WIDE_LEFT));
        s.run_cycle(None);
        s.run_cycle(None);
        assert_eq!(
            s.run_cycle(Some(WIDE_LEFT)),
            CycleOutcome::Retained(Classification::WideLeft)
        );
        assert_eq!(s.miss_count(), 2);

        s.run_cycle(Some(BULLS));
        assert_eq!(s.miss_count(), 0);
    }

    #[test]
    fn shutdown_stops_playback() {
        let mut s = supervisor();
        s.run_cycle(Some(BULLS));
        let token = s.active_task().unwrap().cancel_token();
        s.shutdown();
        assert!(token.is_cancelled());
        assert_eq!(s.active_classification(), Classification::Idle);
    }

    #[test]
    fn dropping_stops_playback() {
        let mut s = supervisor();
        s.run_cycle(Some(BULLS));
        let token = s.active_task().unwrap().cancel_token();
        drop(s);
        assert!(token.is_cancelled());
    }

    #[test]
    fn range_is_informational() {
        let mut s = PlaybackSupervisor::new(&config(), FixedRange(18_000), Arc::new(SilentOutput));
        s.run_cycle(Some(WIDE_LEFT));
        assert_eq!(s.last_range(), Some(18_000));
        assert_eq!(s.active_classification(), Classification::WideLeft);
    }

    #[test]
    fn plays_through_the_given_output() {
        let output = Arc::new(RecordingOutput::default());
        let mut s = PlaybackSupervisor::new(&config(), NoRangeSensor, output.clone());
        s.run_cycle(Some(BULLS));
        s.run_cycle(Some(WIDE_LEFT));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while output.played.lock().unwrap().len() < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let mut played = output.played.lock().unwrap().clone();
        played.sort();
        assert_eq!(played, vec![440, 880]);
    }

    #[test]
    fn grace_delay_is_only_paid_on_replacement() {
        let config = GuidanceConfig {
            handover_grace_secs: 0.05,
            ..GuidanceConfig::default()
        };
        let mut s = PlaybackSupervisor::new(&config, NoRangeSensor, Arc::new(SilentOutput));

        let started = std::time::Instant::now();
        s.run_cycle(Some(WIDE_LEFT));
        assert!(started.elapsed() < Duration::from_millis(50));

        let started = std::time::Instant::now();
        s.run_cycle(Some(BULLS));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
