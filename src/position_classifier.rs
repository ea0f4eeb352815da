//! Maps a detected target position onto the guidance model: a shaped stereo
//! balance, a volume, a pacing distance, and one of a handful of discrete
//! [Classification]s that decide which tone is played.
//!
//! Balance shaping is deliberately non-linear. Anything past
//! `balance_threshold` is hard-panned, anything inside `center_deadzone` is
//! dead centre, and the band in between is stretched onto `(0, 1]` and
//! square-rooted so the response is gentle near the middle and steep
//! towards the edges.

use crate::config::{Boundaries, GuidanceConfig, Pacing};
use std::fmt;

/// Fraction of the centre-to-corner distance that maps to a pacing distance
/// of 1 in [Pacing::Radial] mode. This roughly lines up with where the wide
/// states begin.
const RADIAL_CENTER_REGION: f64 = 0.375;

/// Fraction of the frame height that maps to a pacing distance of 1 in
/// [Pacing::Vertical] mode.
const VERTICAL_CENTER_REGION: f64 = 0.4;

/// Exponent applied to the normalized pacing distance.
const DISTANCE_CURVE: f64 = 0.8;

/// Offset from centre, in pixels, inside which the target counts as hit.
const BULLS_RADIUS_PX: f64 = 10.0;

/// A detected target, in pixel coordinates of the camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetPosition {
    /// Horizontal pixel coordinate, 0 at the left edge
    pub x: i32,
    /// Vertical pixel coordinate, 0 at the top edge
    pub y: i32,
}

impl TargetPosition {
    /// Instantiates a new [TargetPosition].
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Converts a detector output that uses `(0, 0)` to mean "nothing
    /// found" into an explicit optional detection. A real target in the
    /// top-left pixel is lost in this conversion, so only detectors that
    /// actually emit that sentinel should use it.
    pub fn from_legacy(x: i32, y: i32) -> Option<Self> {
        if x == 0 && y == 0 {
            None
        } else {
            Some(Self { x, y })
        }
    }
}

impl fmt::Display for TargetPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

/// The guidance state, each of which has its own sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Classification {
    /// Target is far to the left, the user should aim right
    WideLeft,
    /// Target is far to the right, the user should aim left
    WideRight,
    /// Target is in the central band, follow the panning and the beeps
    Track,
    /// Target is dead centre
    Bulls,
    /// Nothing is playing. Only reached through sustained detection loss,
    /// never from a position.
    #[default]
    Idle,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cue = match self {
            Classification::WideLeft => "aim right",
            Classification::WideRight => "aim left",
            Classification::Track => "follow",
            Classification::Bulls => "shoot",
            Classification::Idle => "idle",
        };
        write!(f, "{:?} ({})", self, cue)
    }
}

/// The continuous part of the guidance model for one detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapingResult {
    /// Stereo balance in `[-1, 1]`, negative is left
    pub balance: f64,
    /// Volume in `[min_volume_db, 0]`, loudest at the centre
    pub volume_db: f64,
    /// Raw offset from the frame centre in pixels, as measured by the
    /// configured [Pacing]
    pub offset_px: f64,
    /// Normalized pacing distance, 0 at the centre and about 1 at the edge
    /// of the central region
    pub distance: f64,
}

/// Stateless transform from [TargetPosition]s to [ShapingResult]s and
/// [Classification]s.
#[derive(Debug, Clone)]
pub struct PositionClassifier {
    boundaries: Boundaries,
    pacing: Pacing,
    balance_threshold: f64,
    center_deadzone: f64,
    min_volume_db: f64,
}

impl PositionClassifier {
    /// Builds a classifier from an already validated config.
    pub fn new(config: &GuidanceConfig) -> Self {
        Self {
            boundaries: config.frame,
            pacing: config.pacing,
            balance_threshold: config.balance_threshold,
            center_deadzone: config.center_deadzone,
            min_volume_db: config.min_volume_db,
        }
    }

    /// Horizontal deflection from the centre line, -1 at the left edge and 1
    /// at the right edge. Positions outside the frame fall outside `[-1, 1]`.
    pub fn raw_balance(&self, position: TargetPosition) -> f64 {
        let (cx, _) = self.boundaries.center();
        (position.x as f64 - cx) / cx
    }

    /// Saturating, dead-zoned, square-root shaping of a raw balance.
    pub fn shape_balance(&self, raw: f64) -> f64 {
        if raw > self.balance_threshold {
            1.0
        } else if raw < -self.balance_threshold {
            -1.0
        } else if raw.abs() <= self.center_deadzone {
            0.0
        } else {
            let stretch = self.balance_threshold / (self.balance_threshold - self.center_deadzone);
            let t = (raw.abs() - self.center_deadzone) * stretch * (1.0 / self.balance_threshold);
            t.sqrt().copysign(raw)
        }
    }

    /// Volume in dB for a raw balance: 0 at the centre, falling to
    /// `min_volume_db` once the target is wide.
    pub fn volume_db(&self, raw: f64) -> f64 {
        let shaped = self.shape_balance(raw.abs());
        self.min_volume_db - (1.0 - shaped.sqrt()) * self.min_volume_db
    }

    /// Pixel offset from the frame centre, measured per the [Pacing] mode.
    pub fn offset_px(&self, position: TargetPosition) -> f64 {
        let (cx, cy) = self.boundaries.center();
        let dy = position.y as f64 - cy;
        match self.pacing {
            Pacing::Vertical => dy.abs(),
            Pacing::Radial => {
                let dx = position.x as f64 - cx;
                (dx.powi(2) + dy.powi(2)).sqrt()
            }
        }
    }

    /// Normalizes a pixel offset into the distance that paces the beeps.
    pub fn pacing_distance(&self, offset_px: f64) -> f64 {
        let normalized = match self.pacing {
            Pacing::Vertical => offset_px / self.boundaries.height as f64 / VERTICAL_CENTER_REGION,
            Pacing::Radial => {
                offset_px / self.boundaries.max_displacement() / RADIAL_CENTER_REGION
            }
        };
        normalized.powf(DISTANCE_CURVE)
    }

    /// Picks the guidance state for a shaped balance and a pixel offset.
    /// Never returns [Classification::Idle].
    pub fn classify(&self, balance: f64, offset_px: f64) -> Classification {
        if balance <= -1.0 {
            return Classification::WideLeft;
        }
        if balance >= 1.0 {
            return Classification::WideRight;
        }
        let on_target = match self.pacing {
            Pacing::Vertical => balance.abs() < self.center_deadzone && offset_px < BULLS_RADIUS_PX,
            Pacing::Radial => offset_px <= BULLS_RADIUS_PX,
        };
        if on_target {
            Classification::Bulls
        } else {
            Classification::Track
        }
    }

    /// Runs the full model for one detection.
    pub fn process(&self, position: TargetPosition) -> (ShapingResult, Classification) {
        let raw = self.raw_balance(position);
        let balance = self.shape_balance(raw);
        let volume_db = self.volume_db(raw);
        let offset_px = self.offset_px(position);
        let distance = self.pacing_distance(offset_px);
        let classification = self.classify(balance, offset_px);

        (
            ShapingResult {
                balance,
                volume_db,
                offset_px,
                distance,
            },
            classification,
        )
    }
}
