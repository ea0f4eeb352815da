//! Sources of target detections, one per video frame.
//!
//! The real vision pipeline lives outside AimTone. It can feed detections in
//! through a [LineDetector], and [BouncingTarget] stands in for it when there
//! is no camera at all.

use crate::config::Boundaries;
use crate::message_decoder::decode_detection_line;
use crate::position_classifier::TargetPosition;

use log::warn;
use rand::prelude::*;
use std::{io::BufRead, ops::RangeInclusive, thread, time::Duration};

/// A typed iterator of per-frame detections. `Some` is a target found in that
/// frame, `None` a frame without one. When the iterator ends, the source is
/// closed.
pub trait TargetDetector: Iterator<Item = Option<TargetPosition>> {}

impl<T> TargetDetector for T where T: Iterator<Item = Option<TargetPosition>> {}

/// A simulated target that drifts diagonally across the frame, bouncing off
/// the edges.
pub struct BouncingTarget {
    bounds: Boundaries,
    position: TargetPosition,
    step: (i32, i32),
    lag_secs: Option<RangeInclusive<f64>>,
    drop_rate: f64,
    rng: StdRng,
}

impl BouncingTarget {
    /// Starts the target at (150, 70), moving 10 px per frame on each axis.
    pub fn new(bounds: Boundaries) -> Self {
        Self {
            bounds,
            position: TargetPosition::new(150, 70),
            step: (10, 10),
            lag_secs: None,
            drop_rate: 0.0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Sleeps for a random time in `secs` before each frame, to imitate a
    /// vision pipeline that is lagging. Negative bounds are raised to zero,
    /// and an empty or non-finite range disables the lag.
    pub fn with_lag(self, secs: RangeInclusive<f64>) -> Self {
        let (start, end) = (secs.start().max(0.0), *secs.end());
        let lag_secs = if start.is_finite() && end.is_finite() && start <= end && end > 0.0 {
            Some(start..=end)
        } else {
            None
        };
        Self { lag_secs, ..self }
    }

    /// Reports a frame as having no target with the given probability.
    pub fn with_drop_rate(self, drop_rate: f64) -> Self {
        Self {
            drop_rate: drop_rate.clamp(0.0, 1.0),
            ..self
        }
    }

    fn advance(&mut self) {
        let (width, height) = (self.bounds.width as i32, self.bounds.height as i32);
        let TargetPosition { x, y } = self.position;

        if (x >= width && self.step.0 > 0) || (x <= 0 && self.step.0 < 0) {
            self.step.0 = -self.step.0;
        }
        if (y >= height && self.step.1 > 0) || (y <= 0 && self.step.1 < 0) {
            self.step.1 = -self.step.1;
        }
        self.position.x += self.step.0;
        self.position.y += self.step.1;
    }
}

impl Iterator for BouncingTarget {
    type Item = Option<TargetPosition>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(lag) = &self.lag_secs {
            let secs = self.rng.gen_range(lag.clone());
            thread::sleep(Duration::from_secs_f64(secs));
        }
        let current = self.position;
        self.advance();

        if self.drop_rate > 0.0 && self.rng.gen_bool(self.drop_rate) {
            Some(None)
        } else {
            Some(Some(current))
        }
    }
}

/// Reads one detection per line from a text stream, such as the stdout of a
/// vision process piped into stdin.
pub struct LineDetector<R: BufRead> {
    reader: R,
    legacy_sentinel: bool,
    line: String,
}

impl<R: BufRead> LineDetector<R> {
    /// Wraps a reader. See [crate::message_decoder::decode_detection_line]
    /// for the line format.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            legacy_sentinel: false,
            line: String::new(),
        }
    }

    /// Also treat `0 0` as "no target", for producers that use the origin
    /// as their empty marker.
    pub fn with_legacy_sentinel(self, legacy_sentinel: bool) -> Self {
        Self {
            legacy_sentinel,
            ..self
        }
    }
}

impl<R: BufRead> Iterator for LineDetector<R> {
    type Item = Option<TargetPosition>;

    fn next(&mut self) -> Option<Self::Item> {
        self.line.clear();
        match self.reader.read_line(&mut self.line) {
            Ok(0) => None,
            Ok(_) => match decode_detection_line(&self.line) {
                Ok(Some(p)) if self.legacy_sentinel => {
                    Some(TargetPosition::from_legacy(p.x, p.y))
                }
                Ok(detection) => Some(detection),
                Err(e) => {
                    warn!("Was unable to parse detection: {}", e);
                    Some(None)
                }
            },
            Err(e) => {
                warn!("Detection stream failed: {}", e);
                None
            }
        }
    }
}
