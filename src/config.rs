//! The [GuidanceConfig] holds every tunable constant of the guidance engine.
//! It is built once at startup, either from [Default] or from a RON file,
//! validated, and then handed by reference to the components that need it.
//! Nothing reads or writes it after that.
//!
//! In a file, every field is optional and falls back to its default:
//!
//! ```text
//! (
//!     frame: (width: 640, height: 480),
//!     pacing: Vertical,
//!     miss_limit: 10,
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, fs::File, io::Read, io::Write, path::Path};

/// Longest any cycle length may be, in milliseconds.
pub const MAX_CYCLE_MS: u32 = 60_000;

/// Highest supported sample rate.
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Pixel dimensions of the camera frame that target positions live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundaries {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Boundaries {
    /// Builds a [Boundaries], rejecting a zero-sized frame since every
    /// normalization divides by these values.
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::Invalid(format!(
                "frame must be non-empty, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    /// The centre of the frame, in pixels.
    pub fn center(&self) -> (f64, f64) {
        (self.width as f64 / 2.0, self.height as f64 / 2.0)
    }

    /// Distance from the centre of the frame to one of its corners.
    pub fn max_displacement(&self) -> f64 {
        let (cx, cy) = self.center();
        (cx.powi(2) + cy.powi(2)).sqrt()
    }
}

impl Default for Boundaries {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// How the distance that drives the beep cadence is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Pacing {
    /// Only the vertical offset from the centre line paces the beeps, the
    /// horizontal offset is left entirely to panning.
    #[default]
    Vertical,
    /// The straight-line offset from the frame centre paces the beeps.
    Radial,
}

/// Everything the guidance engine can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    /// Coordinate space of incoming target positions
    pub frame: Boundaries,
    /// Which offset paces the tracking beeps
    pub pacing: Pacing,
    /// Tone used for every state except bullseye, in Hz
    pub center_freq: u32,
    /// Tone used for the bullseye state, in Hz
    pub bulls_freq: u32,
    /// Longest tracking cycle, blip included, in milliseconds
    pub cycle_max_ms: u32,
    /// Length of the continuous tones, in milliseconds
    pub cycle_min_ms: u32,
    /// Length of the tracking blip, in milliseconds
    pub cycle_blip_ms: u32,
    /// Raw balance beyond which the target counts as wide
    pub balance_threshold: f64,
    /// Raw balance within which the target counts as centred
    pub center_deadzone: f64,
    /// Quietest volume, used at the frame edges, in dB
    pub min_volume_db: f64,
    /// Overlap between a new playback and the one it replaces, in seconds
    pub handover_grace_secs: f64,
    /// Consecutive missed detections before all audio stops
    pub miss_limit: u32,
    /// Sample rate of synthesized audio
    pub sample_rate: u32,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            frame: Boundaries::default(),
            pacing: Pacing::default(),
            center_freq: 440,
            bulls_freq: 880,
            cycle_max_ms: 1000,
            cycle_min_ms: 200,
            cycle_blip_ms: 40,
            balance_threshold: 0.5,
            center_deadzone: 0.06,
            min_volume_db: -16.0,
            handover_grace_secs: 0.2,
            miss_limit: 10,
            sample_rate: 44100,
        }
    }
}

/// Errors raised while loading, validating or writing a [GuidanceConfig].
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read or written
    IoError(std::io::Error),

    /// Serializing the config failed
    RonError(ron::Error),

    /// The config file is not valid RON for a [GuidanceConfig]
    RonSpannedError(ron::de::SpannedError),

    /// The values parsed, but do not make sense together
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ConfigError::IoError(error) => Cow::from(format!("io error: {}", error)),
            ConfigError::RonError(error) => Cow::from(format!("ron error: {}", error)),
            ConfigError::RonSpannedError(error) => {
                Cow::from(format!("ron parse error: {}", error))
            }
            ConfigError::Invalid(reason) => Cow::from(format!("invalid config: {}", reason)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

impl GuidanceConfig {
    /// Read and validate a [GuidanceConfig] from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut handle = File::open(path).map_err(ConfigError::IoError)?;
        Self::from_reader(&mut handle)
    }

    /// Read and validate a [GuidanceConfig] from the [Read]able object
    /// provided.
    pub fn from_reader(reader: &mut impl Read) -> Result<Self, ConfigError> {
        let mut raw_text = String::new();
        reader
            .read_to_string(&mut raw_text)
            .map_err(ConfigError::IoError)?;
        Self::from_ron(&raw_text)
    }

    /// Parse and validate a [GuidanceConfig] from RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text).map_err(ConfigError::RonSpannedError)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config out as pretty RON to the path provided.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let mut handle = File::create(path).map_err(ConfigError::IoError)?;
        self.to_writer(&mut handle)
    }

    /// Write this config out as pretty RON to the [Write]able object
    /// provided.
    pub fn to_writer(&self, writer: &mut impl Write) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(ConfigError::RonError)?;
        writer
            .write_all(text.as_bytes())
            .map_err(ConfigError::IoError)
    }

    /// Checks that the values are consistent with each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::Invalid(reason));

        Boundaries::new(self.frame.width, self.frame.height)?;

        if !(self.center_deadzone >= 0.0 && self.center_deadzone < self.balance_threshold) {
            return invalid(format!(
                "center_deadzone ({}) must be in [0, balance_threshold ({}))",
                self.center_deadzone, self.balance_threshold
            ));
        }
        if !(self.balance_threshold > 0.0 && self.balance_threshold <= 1.0) {
            return invalid(format!(
                "balance_threshold ({}) must be in (0, 1]",
                self.balance_threshold
            ));
        }
        if !(self.min_volume_db < 0.0 && self.min_volume_db.is_finite()) {
            return invalid(format!(
                "min_volume_db ({}) must be a finite negative number",
                self.min_volume_db
            ));
        }
        if self.cycle_min_ms == 0 || self.cycle_blip_ms == 0 {
            return invalid("cycle_min_ms and cycle_blip_ms must be non-zero".to_string());
        }
        if self.cycle_blip_ms > self.cycle_max_ms {
            return invalid(format!(
                "cycle_blip_ms ({}) must not exceed cycle_max_ms ({})",
                self.cycle_blip_ms, self.cycle_max_ms
            ));
        }
        let longest = self.cycle_max_ms.max(self.cycle_min_ms);
        if longest > MAX_CYCLE_MS {
            return invalid(format!(
                "cycle lengths must not exceed {} ms, got {} ms",
                MAX_CYCLE_MS, longest
            ));
        }
        if self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE {
            return invalid(format!(
                "sample_rate ({}) must be in (0, {}]",
                self.sample_rate, MAX_SAMPLE_RATE
            ));
        }
        let nyquist = self.sample_rate / 2;
        if self.center_freq == 0 || self.center_freq >= nyquist {
            return invalid(format!(
                "center_freq ({}) must be in (0, {})",
                self.center_freq, nyquist
            ));
        }
        if self.bulls_freq == 0 || self.bulls_freq >= nyquist {
            return invalid(format!(
                "bulls_freq ({}) must be in (0, {})",
                self.bulls_freq, nyquist
            ));
        }
        if !(self.handover_grace_secs >= 0.0 && self.handover_grace_secs.is_finite()) {
            return invalid(format!(
                "handover_grace_secs ({}) must be a finite non-negative number",
                self.handover_grace_secs
            ));
        }
        if self.miss_limit == 0 {
            return invalid("miss_limit must be at least 1".to_string());
        }

        Ok(())
    }
}
