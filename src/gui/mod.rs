//! Terminal interfaces built on ratatui: picking the rangefinder's serial
//! port, and a live view of the guidance loop.

mod device_selector;
mod error;
mod monitor;

pub use device_selector::device_selector;
pub use error::GuiError;
pub use monitor::{monitor, MonitorSummary};
