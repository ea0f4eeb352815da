//! AimTone guides a user's aim with sound. A vision system reports where a
//! target sits in the camera frame, and AimTone turns each report into a
//! continuously looping stereo cue:
//!
//! - a steady tone hard-panned to one side when the target is far off to
//!   that side;
//! - panned beeps that speed up as the target approaches the centre;
//! - a higher pitched tone once the target is dead centre.
//!
//! The pipeline is a [PositionClassifier](position_classifier::PositionClassifier)
//! that maps a position to a cue and its shaping, a
//! [ToneSynthesizer](tone_synthesizer::ToneSynthesizer) that renders the cue,
//! and a [PlaybackSupervisor](supervisor::PlaybackSupervisor) that keeps
//! exactly one cue playing and hands over smoothly when it changes. An
//! optional serial rangefinder reports the distance to the target alongside.

#![warn(missing_docs)]
pub mod args;
pub mod config;
pub mod gui;
pub mod message_decoder;
pub mod playback;
pub mod position_classifier;
pub mod range_sensor;
#[cfg(feature = "streaming")]
pub mod rodio_output;
pub mod serial_lidar;
pub mod supervisor;
pub mod target_detector;
pub mod tone_synthesizer;
pub mod wav_export;
