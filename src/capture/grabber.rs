//! Frame grabber abstraction
//!
//! The grabber owns the hardware session: it loads firmware, accepts
//! register writes and AEC state, and pushes frame-ready and fault events
//! from its own capture context to every attached sink.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::frame::Frame;
use crate::control::aec::AecState;
use crate::control::registers::RegisterWrite;

/// Firmware images handed to the grabber before capture starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwarePaths {
    /// FPGA bitstream programming the grabber logic.
    pub fpga_bitstream: PathBuf,
    /// Sensor controller firmware.
    pub sensor_firmware: PathBuf,
}

/// Asynchronous exception reported by the grabber during capture.
///
/// Faults are notifications, not errors: the delivery layer logs them and
/// keeps serving its last-known-good output.
#[derive(Debug, Clone)]
pub struct DeviceFault {
    pub description: String,
}

#[derive(Debug, Error)]
pub enum GrabberError {
    #[error("firmware load failed: {0}")]
    Firmware(String),
    #[error("capture session error: {0}")]
    Session(String),
}

/// Receiver of grabber events. Implementations must tolerate delivery from
/// the grabber's capture thread(s), concurrently across channels.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: Frame);
    fn on_fault(&self, fault: &DeviceFault);
}

/// The hardware session collaborator.
///
/// Several sinks may be attached to one grabber; each receives every event
/// and makes its own delivery decisions.
pub trait FrameGrabber: Send {
    fn write_register(&mut self, write: &RegisterWrite) -> Result<(), GrabberError>;

    fn load_firmware(&mut self, firmware: &FirmwarePaths) -> Result<(), GrabberError>;

    /// Replace the grabber's AEC state set with `states`.
    fn apply_aec(&mut self, states: &[AecState]) -> Result<(), GrabberError>;

    /// Switch the colour pipeline between raw sensor output and
    /// reconstructed RGB.
    fn set_colour_reconstruction(&mut self, enabled: bool) -> Result<(), GrabberError>;

    fn attach(&mut self, sink: Arc<dyn FrameSink>);

    fn start_capture(&mut self) -> Result<(), GrabberError>;

    fn stop_capture(&mut self) -> Result<(), GrabberError>;
}
