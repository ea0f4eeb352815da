//! Driver for a serial rangefinder that streams its distance readings as
//! newline-separated text.

use crate::message_decoder::decode_range_frame;
use crate::range_sensor::{Millimeters, RangeError, RangeSensor};

use log::{debug, info};
use serial2::SerialPort;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Line speed the rangefinder talks at.
pub const LIDAR_BAUD: u32 = 115200;

/// Command that switches the rangefinder into continuous measurement.
const START_COMMAND: [u8; 4] = [0x00, 0x11, 0x01, 0x45];

/// Each reading is decoded from at most this many bytes.
const READ_LEN: usize = 20;

const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// A rangefinder attached to a serial port.
pub struct SerialLidar {
    port: SerialPort,
    path: PathBuf,
}

impl SerialLidar {
    /// Opens the rangefinder at `path` and starts it measuring.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RangeError> {
        let path = path.as_ref().to_path_buf();
        let mut port = SerialPort::open(&path, LIDAR_BAUD)?;
        port.set_read_timeout(READ_TIMEOUT)?;
        port.write_all(&START_COMMAND)?;
        info!("Rangefinder opened on {}", path.display());

        Ok(Self { port, path })
    }

    /// Serial ports that could have a rangefinder on them.
    pub fn available_ports() -> Result<Vec<PathBuf>, RangeError> {
        Ok(SerialPort::available_ports()?)
    }

    /// The port this rangefinder was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RangeSensor for SerialLidar {
    fn read_range(&mut self) -> Result<Millimeters, RangeError> {
        let mut buffer = [0; READ_LEN];
        let read_len = self.port.read(&mut buffer)?;
        let range = decode_range_frame(&buffer[..read_len]);
        debug!("Rangefinder read {} bytes -> {:?}", read_len, range);
        Ok(range?)
    }
}
