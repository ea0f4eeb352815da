//! Plays [ToneLoop]s on the system's default audio device through rodio.
//! Only built with the `streaming` feature.

use crate::playback::{AudioOutput, CancelToken, OutputError, POLL_INTERVAL};
use crate::tone_synthesizer::{ToneLoop, CHANNELS};

use rodio::{OutputStream, Sink, Source};
use std::time::Duration;

/// Streams a [ToneLoop] sample by sample, wrapping around the single
/// rendered cycle instead of materializing every repetition.
struct ToneSource {
    tone: ToneLoop,
    pos: usize,
}

impl ToneSource {
    fn new(tone: ToneLoop) -> Self {
        Self { tone, pos: 0 }
    }
}

impl Iterator for ToneSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.pos >= self.tone.len() {
            return None;
        }
        let cycle = self.tone.cycle();
        let sample = cycle[self.pos % cycle.len()];
        self.pos += 1;
        Some(sample)
    }
}

impl Source for ToneSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.tone.len() - self.pos)
    }

    fn channels(&self) -> u16 {
        CHANNELS
    }

    fn sample_rate(&self) -> u32 {
        self.tone.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.tone.duration())
    }
}

/// An [AudioOutput] backed by the default rodio output device.
///
/// The device is opened by each playback thread, since rodio's
/// `OutputStream` has to stay on the thread that created it.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioOutput;

impl AudioOutput for RodioOutput {
    fn play(&self, tone: &ToneLoop, cancel: &CancelToken) -> Result<(), OutputError> {
        if tone.is_empty() {
            return Ok(());
        }

        let (_stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| OutputError::Device(format!("failed to open stream: {}", e)))?;
        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| OutputError::Device(format!("failed to create sink: {}", e)))?;

        sink.append(ToneSource::new(tone.clone()));

        while !sink.empty() {
            if cancel.is_cancelled() {
                sink.stop();
                break;
            }
            spin_sleep::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "RodioOutput"
    }
}
