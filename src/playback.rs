//! Background playback of [ToneLoop]s.
//!
//! Every sound the supervisor starts runs on its own thread as a
//! [PlaybackTask]. The thread hands its loop to an [AudioOutput] and blocks
//! until the loop either runs out or is cancelled through the task's
//! [CancelToken]. Cancelling only flips a flag. It never waits for the
//! thread, and cancelling a task that already finished is harmless.

use crate::position_classifier::Classification;
use crate::tone_synthesizer::ToneLoop;

use log::{debug, warn};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// How often outputs check for cancellation while a loop is playing.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared flag that tells a playback thread to stop early.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the owner of this token to stop. Never blocks.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [CancelToken::cancel] has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Errors an [AudioOutput] can hit while playing.
#[derive(Debug)]
pub enum OutputError {
    /// The audio device could not be opened or refused the stream
    Device(String),
    /// The playback thread could not be started
    Spawn(std::io::Error),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::Device(reason) => write!(f, "audio device error: {}", reason),
            OutputError::Spawn(error) => write!(f, "failed to start playback thread: {}", error),
        }
    }
}

impl std::error::Error for OutputError {}

/// Something that can play a [ToneLoop] to completion.
///
/// `play` runs on a dedicated playback thread. It should return once the
/// loop has been played in full, or soon after `cancel` is set.
pub trait AudioOutput: Send + Sync {
    /// Plays `tone`, blocking the calling thread.
    fn play(&self, tone: &ToneLoop, cancel: &CancelToken) -> Result<(), OutputError>;

    /// A short name for logs.
    fn name(&self) -> &'static str;
}

/// An [AudioOutput] that makes no sound but takes as long as the loop would.
/// Used when running headless and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentOutput;

impl AudioOutput for SilentOutput {
    fn play(&self, tone: &ToneLoop, cancel: &CancelToken) -> Result<(), OutputError> {
        let deadline = Instant::now() + tone.duration();
        while !cancel.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            spin_sleep::sleep(POLL_INTERVAL.min(deadline - now));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SilentOutput"
    }
}

/// A running (or finished) playback thread and the means to stop it.
#[derive(Debug)]
pub struct PlaybackTask {
    id: u64,
    classification: Classification,
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

impl PlaybackTask {
    /// Starts playing `tone` through `output` on a new thread.
    pub fn spawn(
        id: u64,
        classification: Classification,
        output: Arc<dyn AudioOutput>,
        tone: ToneLoop,
    ) -> Result<Self, OutputError> {
        let cancel = CancelToken::new();
        let th_cancel = cancel.clone();

        let handle = thread::Builder::new()
            .name(format!("playback-{}", id))
            .spawn(move || {
                debug!(
                    "playback-{} : {} started on {} for {:.1?}.",
                    id,
                    classification,
                    output.name(),
                    tone.duration()
                );
                match output.play(&tone, &th_cancel) {
                    Ok(()) if th_cancel.is_cancelled() => {
                        debug!("playback-{} : cancelled.", id)
                    }
                    Ok(()) => debug!("playback-{} : ran to completion.", id),
                    Err(error) => warn!("playback-{} : {}.", id, error),
                }
            })
            .map_err(OutputError::Spawn)?;

        Ok(Self {
            id,
            classification,
            cancel,
            handle,
        })
    }

    /// Identifier assigned by whoever spawned this task.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The guidance state this task is sounding.
    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// A clone of the task's cancellation flag.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the playback thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Requests that playback stop, without waiting for it to happen.
    ///
    /// Returns `false` when the thread had already exited, in which case
    /// there was nothing left to stop.
    pub fn terminate(&self) -> bool {
        let was_running = !self.is_finished();
        self.cancel.cancel();
        was_running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuidanceConfig;
    use crate::position_classifier::ShapingResult;
    use crate::tone_synthesizer::ToneSynthesizer;

    fn wide_left_loop() -> ToneLoop {
        let shaping = ShapingResult {
            balance: -1.0,
            volume_db: -16.0,
            offset_px: 0.0,
            distance: 0.5,
        };
        ToneSynthesizer::new(&GuidanceConfig::default())
            .synthesize(Classification::WideLeft, &shaping)
            .unwrap()
    }

    fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn terminate_stops_a_long_loop() {
        let task = PlaybackTask::spawn(
            7,
            Classification::WideLeft,
            Arc::new(SilentOutput),
            wide_left_loop(),
        )
        .unwrap();
        assert_eq!(task.id(), 7);
        assert_eq!(task.classification(), Classification::WideLeft);
        assert!(!task.is_finished());

        assert!(task.terminate());
        assert!(wait_until(Duration::from_secs(2), || task.is_finished()));
        // A second request finds nothing left to stop
        assert!(!task.terminate());
    }

    #[test]
    fn silent_output_returns_immediately_when_pre_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let started = Instant::now();
        SilentOutput.play(&wide_left_loop(), &cancel).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
