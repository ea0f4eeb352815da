//! Turns a [Classification] and its [ShapingResult] into sound.
//!
//! Synthesis happens in three steps. [ToneSynthesizer::describe] picks the
//! tone, pan and segment pattern for a state as an [AudioDescriptor]. The
//! descriptor is then rendered into one interleaved stereo cycle. Finally
//! [ToneSynthesizer::expand] wraps that cycle into a [ToneLoop] that plays it
//! back-to-back many times. The loop is long enough that an unchanged state
//! can keep sounding across many guidance cycles without being restarted.

use crate::config::GuidanceConfig;
use crate::position_classifier::{Classification, ShapingResult};

use std::{f64::consts::PI, sync::Arc, time::Duration};

/// Level of a segment that should produce no sound at all.
pub const SILENT_DB: f64 = f64::NEG_INFINITY;

/// A rendered cycle is doubled this many times to build a [ToneLoop].
pub const LOOP_DOUBLINGS: u32 = 10;

/// Output is always interleaved stereo.
pub const CHANNELS: u16 = 2;

/// One stretch of constant level within a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Length of the segment in milliseconds
    pub duration_ms: f64,
    /// Level relative to full scale, [SILENT_DB] for silence
    pub volume_db: f64,
}

impl Segment {
    /// An audible segment at the given level.
    pub fn tone(duration_ms: f64, volume_db: f64) -> Self {
        Self {
            duration_ms,
            volume_db,
        }
    }

    /// A segment of silence.
    pub fn silence(duration_ms: f64) -> Self {
        Self {
            duration_ms,
            volume_db: SILENT_DB,
        }
    }

    /// Whether this segment produces sound.
    pub fn is_silent(&self) -> bool {
        self.volume_db == SILENT_DB
    }
}

/// Everything needed to render one cycle of a guidance sound.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioDescriptor {
    /// Sine frequency in Hz
    pub tone_hz: u32,
    /// Stereo position in `[-1, 1]`, negative is left
    pub pan: f64,
    /// Segments played in order, each restarting the sine at phase zero
    pub segments: Vec<Segment>,
}

impl AudioDescriptor {
    /// Length of a single cycle.
    pub fn cycle_duration(&self) -> Duration {
        let ms: f64 = self.segments.iter().map(|s| s.duration_ms.max(0.0)).sum();
        Duration::from_secs_f64(ms / 1000.0)
    }

    /// Renders one cycle as interleaved stereo `f32` samples.
    pub fn render(&self, sample_rate: u32) -> Vec<f32> {
        let (left_gain, right_gain) = pan_gains(self.pan);
        let angular = 2.0 * PI * self.tone_hz as f64 / sample_rate as f64;

        let mut samples = Vec::new();
        for segment in &self.segments {
            let frames = segment_frames(segment.duration_ms, sample_rate);
            samples.reserve(frames * CHANNELS as usize);
            if segment.is_silent() {
                samples.resize(samples.len() + frames * CHANNELS as usize, 0.0);
                continue;
            }
            let amplitude = db_to_gain(segment.volume_db);
            for n in 0..frames {
                let mono = amplitude * (angular * n as f64).sin();
                samples.push((mono * left_gain).clamp(-1.0, 1.0) as f32);
                samples.push((mono * right_gain).clamp(-1.0, 1.0) as f32);
            }
        }
        samples
    }
}

/// Number of whole frames a segment occupies.
fn segment_frames(duration_ms: f64, sample_rate: u32) -> usize {
    (duration_ms.max(0.0) * sample_rate as f64 / 1000.0) as usize
}

/// Converts a level in dB to a linear gain, treating [SILENT_DB] as 0.
pub fn db_to_gain(db: f64) -> f64 {
    if db == SILENT_DB {
        0.0
    } else {
        10f64.powf(db / 20.0)
    }
}

/// Left and right linear gains for a pan position.
///
/// The side being panned towards is boosted by up to 3 dB at the extremes,
/// while the opposite side is attenuated down to silence. A centred pan
/// leaves both channels untouched.
pub fn pan_gains(pan: f64) -> (f64, f64) {
    let pan = pan.clamp(-1.0, 1.0);
    // A boost of |pan| * 6.02 dB is a linear factor of 2^|pan|
    let boost_factor = 2f64.powf(pan.abs());
    let reduce = (2.0 - boost_factor).max(0.0);
    let boost = boost_factor.sqrt();

    if pan < 0.0 {
        (boost, reduce)
    } else {
        (reduce, boost)
    }
}

/// One rendered cycle played back-to-back a fixed number of times.
///
/// Only the single cycle is held in memory and cloning is cheap, so a loop
/// can be handed to a playback thread without copying samples.
#[derive(Debug, Clone)]
pub struct ToneLoop {
    descriptor: AudioDescriptor,
    cycle: Arc<[f32]>,
    sample_rate: u32,
    repetitions: u32,
}

impl ToneLoop {
    /// The descriptor this loop was rendered from.
    pub fn descriptor(&self) -> &AudioDescriptor {
        &self.descriptor
    }

    /// Interleaved samples of a single cycle.
    pub fn cycle(&self) -> &[f32] {
        &self.cycle
    }

    /// Sample rate of the rendered audio.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// How many times the cycle repeats.
    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    /// Total number of interleaved samples across every repetition.
    pub fn len(&self) -> usize {
        self.cycle.len() * self.repetitions as usize
    }

    /// Whether the loop has no samples at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wall-clock length of the whole loop.
    pub fn duration(&self) -> Duration {
        let frames = self.len() / CHANNELS as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    /// Every interleaved sample of the loop, in playback order.
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.cycle.iter().copied().cycle().take(self.len())
    }
}

/// Stateless builder of guidance sounds.
#[derive(Debug, Clone)]
pub struct ToneSynthesizer {
    center_freq: u32,
    bulls_freq: u32,
    cycle_max_ms: f64,
    cycle_min_ms: f64,
    cycle_blip_ms: f64,
    sample_rate: u32,
}

impl ToneSynthesizer {
    /// Builds a synthesizer from an already validated config.
    pub fn new(config: &GuidanceConfig) -> Self {
        Self {
            center_freq: config.center_freq,
            bulls_freq: config.bulls_freq,
            cycle_max_ms: config.cycle_max_ms as f64,
            cycle_min_ms: config.cycle_min_ms as f64,
            cycle_blip_ms: config.cycle_blip_ms as f64,
            sample_rate: config.sample_rate,
        }
    }

    /// Picks the sound for a guidance state. [Classification::Idle] has no
    /// sound and yields `None`.
    pub fn describe(
        &self,
        classification: Classification,
        shaping: &ShapingResult,
    ) -> Option<AudioDescriptor> {
        let wide = |pan: f64| AudioDescriptor {
            tone_hz: self.center_freq,
            pan,
            segments: vec![Segment::tone(self.cycle_min_ms, shaping.volume_db)],
        };

        match classification {
            Classification::WideLeft => Some(wide(-1.0)),
            Classification::WideRight => Some(wide(1.0)),
            Classification::Track => {
                // Squaring makes the beeps speed up sharply near the centre
                let gap = (self.cycle_max_ms - self.cycle_blip_ms) * shaping.distance.powi(2);
                Some(AudioDescriptor {
                    tone_hz: self.center_freq,
                    pan: shaping.balance,
                    segments: vec![
                        Segment::tone(self.cycle_blip_ms, shaping.volume_db),
                        Segment::silence(gap),
                    ],
                })
            }
            Classification::Bulls => Some(AudioDescriptor {
                tone_hz: self.bulls_freq,
                pan: 0.0,
                segments: vec![Segment::tone(self.cycle_min_ms, shaping.volume_db / 2.0)],
            }),
            Classification::Idle => None,
        }
    }

    /// Renders a descriptor and loops it `2^LOOP_DOUBLINGS` times.
    pub fn expand(&self, descriptor: AudioDescriptor) -> ToneLoop {
        let cycle: Arc<[f32]> = descriptor.render(self.sample_rate).into();
        ToneLoop {
            descriptor,
            cycle,
            sample_rate: self.sample_rate,
            repetitions: 1 << LOOP_DOUBLINGS,
        }
    }

    /// [ToneSynthesizer::describe] followed by [ToneSynthesizer::expand].
    pub fn synthesize(
        &self,
        classification: Classification,
        shaping: &ShapingResult,
    ) -> Option<ToneLoop> {
        self.describe(classification, shaping)
            .map(|descriptor| self.expand(descriptor))
    }
}
