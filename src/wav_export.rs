//! Writes guidance sounds out to WAV files, so they can be listened to or
//! inspected without an audio device.

use crate::tone_synthesizer::{ToneLoop, CHANNELS};

use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;
use std::{fmt, path::Path};

const BITS_PER_SAMPLE: u16 = 32;

/// Errors while exporting audio.
#[derive(Debug)]
pub enum ExportError {
    /// Zero cycles were requested
    NothingToWrite,
    /// hound failed to create or write the file
    HoundError(hound::Error),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::NothingToWrite => write!(f, "refusing to write an empty WAV file"),
            ExportError::HoundError(error) => write!(f, "could not write WAV: {}", error),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<hound::Error> for ExportError {
    fn from(value: hound::Error) -> Self {
        Self::HoundError(value)
    }
}

/// The format every export is written in: interleaved stereo 32-bit float.
pub fn export_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: CHANNELS,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Float,
    }
}

/// Writes `cycles` back-to-back repetitions of the loop's cycle to `path`.
///
/// Returns the number of frames written. The loop's own repetition count is
/// ignored, a full loop is usually far longer than anyone wants on disk.
pub fn write_cycles(
    path: impl AsRef<Path>,
    tone: &ToneLoop,
    cycles: u32,
) -> Result<usize, ExportError> {
    if cycles == 0 {
        return Err(ExportError::NothingToWrite);
    }
    let mut writer = WavWriter::create(path.as_ref(), export_spec(tone.sample_rate()))?;

    for _ in 0..cycles {
        for &sample in tone.cycle() {
            writer.write_sample(sample)?;
        }
    }

    let frames = tone.cycle().len() / CHANNELS as usize * cycles as usize;
    // Finalizing explicitly surfaces header errors that drop would swallow
    writer.finalize()?;
    info!(
        "Wrote {} frames of {} Hz to {}",
        frames,
        tone.descriptor().tone_hz,
        path.as_ref().display()
    );
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuidanceConfig;
    use crate::position_classifier::{Classification, ShapingResult};
    use crate::tone_synthesizer::ToneSynthesizer;
    use hound::WavReader;
    use tempfile::tempdir;

    fn track_loop() -> ToneLoop {
        let shaping = ShapingResult {
            balance: 0.5,
            volume_db: -3.0,
            offset_px: 40.0,
            distance: 0.5,
        };
        ToneSynthesizer::new(&GuidanceConfig::default())
            .synthesize(Classification::Track, &shaping)
            .unwrap()
    }

    #[test]
    fn written_file_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("track.wav");
        let tone = track_loop();

        let frames = write_cycles(&path, &tone, 3).unwrap();
        assert_eq!(frames, tone.cycle().len() / 2 * 3);

        let mut reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec(), export_spec(44100));
        assert_eq!(reader.duration() as usize, frames);

        let samples = reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, hound::Error>>()
            .unwrap();
        let cycle = tone.cycle();
        assert_eq!(&samples[..cycle.len()], cycle);
        assert_eq!(&samples[2 * cycle.len()..], cycle);
    }

    #[test]
    fn zero_cycles_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        assert!(matches!(
            write_cycles(&path, &track_loop(), 0),
            Err(ExportError::NothingToWrite)
        ));
        assert!(!path.exists());
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("out.wav");
        assert!(matches!(
            write_cycles(&path, &track_loop(), 1),
            Err(ExportError::HoundError(_))
        ));
    }
}
