//! The rangefinder side of AimTone.
//!
//! A [RangeSensor] is anything that can be asked how far away the target is.
//! Reads are allowed to fail for any reason: a missing device, a timeout, or
//! garbage on the line. Callers only ever see "a reading" or "no reading".
//! [PolledRangeSensor] moves a slow, blocking sensor onto its own thread so
//! that the guidance loop can ask for a reading without waiting.

use crate::message_decoder::DecodeError;

use log::{debug, info};
use std::{
    collections::VecDeque,
    fmt,
    sync::{mpsc, Arc, Mutex},
    thread,
    time::Duration,
};

/// Distances are reported in whole millimetres.
pub type Millimeters = u32;

/// How many recent valid readings [PolledRangeSensor] averages over.
const RANGE_HISTORY: usize = 5;

/// Why a range could not be read.
#[derive(Debug)]
pub enum RangeError {
    /// There is no sensor, or it has not produced a valid reading yet
    Unavailable,
    /// The sensor could not be opened or read
    IoError(std::io::Error),
    /// The sensor answered with something unreadable
    Decode(DecodeError),
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeError::Unavailable => write!(f, "no range reading available"),
            RangeError::IoError(error) => write!(f, "rangefinder io error: {}", error),
            RangeError::Decode(error) => write!(f, "rangefinder sent junk: {}", error),
        }
    }
}

impl std::error::Error for RangeError {}

impl From<std::io::Error> for RangeError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<DecodeError> for RangeError {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// A source of distance-to-target readings.
pub trait RangeSensor {
    /// Reads the current distance to the target.
    fn read_range(&mut self) -> Result<Millimeters, RangeError>;
}

impl<S: RangeSensor + ?Sized> RangeSensor for Box<S> {
    fn read_range(&mut self) -> Result<Millimeters, RangeError> {
        (**self).read_range()
    }
}

/// Stand-in for a rangefinder that is not connected. Every read fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRangeSensor;

impl RangeSensor for NoRangeSensor {
    fn read_range(&mut self) -> Result<Millimeters, RangeError> {
        Err(RangeError::Unavailable)
    }
}

enum Signal {
    Stop,
}

/// Reads a blocking [RangeSensor] on a background thread and serves the
/// mean of the most recent valid readings without blocking.
pub struct PolledRangeSensor {
    handle: Option<thread::JoinHandle<()>>,
    tx: mpsc::Sender<Signal>,
    readings: Arc<Mutex<VecDeque<Millimeters>>>,
}

impl PolledRangeSensor {
    /// Starts polling `sensor`, waiting `interval` between reads.
    pub fn spawn<S>(mut sensor: S, interval: Duration) -> Self
    where
        S: RangeSensor + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Signal>();
        let readings = Arc::new(Mutex::new(VecDeque::with_capacity(RANGE_HISTORY)));
        let th_readings = Arc::clone(&readings);

        let handle = thread::spawn(move || {
            loop {
                match rx.try_recv() {
                    Ok(Signal::Stop) | Err(mpsc::TryRecvError::Disconnected) => break,
                    Err(mpsc::TryRecvError::Empty) => {}
                }
                match sensor.read_range() {
                    Ok(range) => {
                        if let Ok(mut readings) = th_readings.lock() {
                            if readings.len() == RANGE_HISTORY {
                                readings.pop_front();
                            }
                            readings.push_back(range);
                        }
                    }
                    Err(error) => debug!("Range poll failed: {}", error),
                }
                if !interval.is_zero() {
                    thread::sleep(interval);
                }
            }
            info!("Range poller : terminated.");
        });

        Self {
            handle: Some(handle),
            tx,
            readings,
        }
    }

    /// Stops the polling thread and waits for it to exit.
    pub fn stop(&mut self) {
        // The thread may already be gone, in which case there is no one to
        // tell and nothing to wait for.
        let _ = self.tx.send(Signal::Stop);
        if let Some(thread) = self.handle.take() {
            let _ = thread.join();
        }
    }
}

impl RangeSensor for PolledRangeSensor {
    fn read_range(&mut self) -> Result<Millimeters, RangeError> {
        let readings = self.readings.lock().map_err(|_| RangeError::Unavailable)?;
        if readings.is_empty() {
            return Err(RangeError::Unavailable);
        }
        let sum: u64 = readings.iter().map(|&r| r as u64).sum();
        Ok((sum / readings.len() as u64) as Millimeters)
    }
}

impl Drop for PolledRangeSensor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Replays a fixed script of results, then keeps failing.
    struct ScriptedSensor {
        script: VecDeque<Result<Millimeters, RangeError>>,
    }

    impl ScriptedSensor {
        fn new(script: Vec<Result<Millimeters, RangeError>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl RangeSensor for ScriptedSensor {
        fn read_range(&mut self) -> Result<Millimeters, RangeError> {
            self.script.pop_front().unwrap_or(Err(RangeError::Unavailable))
        }
    }

    fn wait_for_reading(
        sensor: &mut PolledRangeSensor,
        expected: Millimeters,
    ) -> Option<Millimeters> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut last = None;
        while Instant::now() < deadline {
            last = sensor.read_range().ok();
            if last == Some(expected) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        last
    }

    #[test]
    fn no_sensor_always_fails() {
        assert!(matches!(
            NoRangeSensor.read_range(),
            Err(RangeError::Unavailable)
        ));
    }

    #[test]
    fn boxed_sensors_forward() {
        let mut boxed: Box<dyn RangeSensor> = Box::new(ScriptedSensor::new(vec![Ok(12)]));
        assert_eq!(boxed.read_range().unwrap(), 12);
    }

    #[test]
    fn poller_averages_valid_readings() {
        let sensor = ScriptedSensor::new(vec![
            Ok(1000),
            Err(RangeError::Decode(DecodeError {
                input: "junk".to_string(),
            })),
            Ok(2000),
            Err(RangeError::Unavailable),
            Ok(3000),
        ]);
        let mut poller = PolledRangeSensor::spawn(sensor, Duration::from_millis(1));
        assert_eq!(wait_for_reading(&mut poller, 2000), Some(2000));
        poller.stop();
    }

    #[test]
    fn poller_keeps_only_recent_history() {
        let script = (1..=8).map(|i| Ok(i * 100)).collect();
        let mut poller =
            PolledRangeSensor::spawn(ScriptedSensor::new(script), Duration::from_millis(1));
        // Mean of the last five: 400..=800
        assert_eq!(wait_for_reading(&mut poller, 600), Some(600));
    }

    #[test]
    fn poller_without_readings_is_unavailable() {
        let mut poller = PolledRangeSensor::spawn(NoRangeSensor, Duration::from_millis(1));
        assert!(matches!(
            poller.read_range(),
            Err(RangeError::Unavailable)
        ));
    }
}
