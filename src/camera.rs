//! Camera session facade
//!
//! One parameterized component covers single- and dual-sensor operation:
//! the configured [`SensorChannel`] decides which sensors receive register
//! writes and AEC state and whether the delivery queue pair-synchronizes.
//! Control calls validate before touching the grabber, so a rejected value
//! never reaches the hardware.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::capture::frame::{Frame, FrameOutput, SensorChannel};
use crate::capture::grabber::{DeviceFault, FirmwarePaths, FrameGrabber, FrameSink, GrabberError};
use crate::control::aec::AecController;
use crate::control::registers::{self, RegisterError, RegisterKind, SensorModel};
use crate::pipeline::queue::{FrameQueue, QueueStats};
use crate::Config;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error(transparent)]
    Register(#[from] RegisterError),
    #[error(transparent)]
    Grabber(#[from] GrabberError),
}

/// A camera session: grabber, delivery queue and control state wired
/// together for one sensor model and channel configuration.
pub struct Camera {
    model: SensorModel,
    channel: SensorChannel,
    grabber: Box<dyn FrameGrabber>,
    queue: Arc<FrameQueue>,
    aec: AecController,
}

impl Camera {
    /// Wire `grabber` to a fresh delivery queue. Firmware configured in
    /// `config` is loaded immediately.
    pub fn new(
        model: SensorModel,
        channel: SensorChannel,
        mut grabber: Box<dyn FrameGrabber>,
        config: &Config,
    ) -> Result<Self, CameraError> {
        let queue = Arc::new(FrameQueue::new(channel, config.sync.tolerance_us));
        grabber.attach(Arc::clone(&queue) as Arc<dyn FrameSink>);

        if let Some(firmware) = &config.capture.firmware {
            grabber.load_firmware(firmware)?;
        }

        info!(?model, ?channel, "camera session ready");
        Ok(Self {
            model,
            channel,
            grabber,
            queue,
            aec: AecController::new(),
        })
    }

    /// Encode `kind` for every active channel and issue the writes.
    /// Validation happens first; an out-of-range value mutates nothing.
    fn write_registers(&mut self, kind: RegisterKind, value: u16) -> Result<(), CameraError> {
        let writes = registers::encode(self.model, kind, value, self.channel)?;
        for write in &writes {
            self.grabber.write_register(write)?;
        }
        Ok(())
    }

    pub fn set_gain(&mut self, value: u16) -> Result<(), CameraError> {
        self.write_registers(RegisterKind::Gain, value)
    }

    pub fn set_offset(&mut self, value: u16) -> Result<(), CameraError> {
        self.write_registers(RegisterKind::Offset, value)
    }

    pub fn set_exposure(&mut self, value: u16) -> Result<(), CameraError> {
        self.write_registers(RegisterKind::Exposure, value)
    }

    pub fn set_frame_rate(&mut self, value: u16) -> Result<(), CameraError> {
        self.write_registers(RegisterKind::FrameRate, value)
    }

    /// Rebuild the per-channel AEC states with the default tuning profile
    /// and hand the new set to the grabber.
    pub fn reconfigure_aec(&mut self) -> Result<(), CameraError> {
        let states = self.aec.reconfigure(self.channel);
        self.grabber.apply_aec(states)?;
        Ok(())
    }

    pub fn enable_aec(&mut self) -> Result<(), CameraError> {
        self.set_aec_enabled(true)
    }

    pub fn disable_aec(&mut self) -> Result<(), CameraError> {
        self.set_aec_enabled(false)
    }

    /// Toggling before the first reconfiguration has nothing to act on and
    /// is accepted silently.
    fn set_aec_enabled(&mut self, enabled: bool) -> Result<(), CameraError> {
        let states = self.aec.set_enabled(enabled);
        if states.is_empty() {
            return Ok(());
        }
        self.grabber.apply_aec(states)?;
        Ok(())
    }

    pub fn enable_colour_reconstruction(&mut self) -> Result<(), CameraError> {
        Ok(self.grabber.set_colour_reconstruction(true)?)
    }

    pub fn disable_colour_reconstruction(&mut self) -> Result<(), CameraError> {
        Ok(self.grabber.set_colour_reconstruction(false)?)
    }

    pub fn load_firmware(&mut self, firmware: &FirmwarePaths) -> Result<(), CameraError> {
        Ok(self.grabber.load_firmware(firmware)?)
    }

    pub fn start_capture(&mut self) -> Result<(), CameraError> {
        Ok(self.grabber.start_capture()?)
    }

    pub fn stop_capture(&mut self) -> Result<(), CameraError> {
        Ok(self.grabber.stop_capture()?)
    }

    /// Most recent delivered output, if any. Stays readable after capture
    /// stops.
    pub fn last_output(&self) -> Option<Arc<FrameOutput>> {
        self.queue.latest()
    }

    /// Most recent delivered frame (the left half of a pair in dual mode),
    /// or the empty sentinel before anything was captured.
    pub fn last_frame(&self) -> Frame {
        self.queue
            .latest()
            .map(|output| output.primary().clone())
            .unwrap_or_else(|| Frame::empty(self.channel.sensor_ids()[0]))
    }

    /// Register a callback invoked per delivered frame, on the capture
    /// thread.
    pub fn subscribe_to_frames<F>(&self, callback: F)
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.queue.subscribe(callback);
    }

    pub fn last_fault(&self) -> Option<DeviceFault> {
        self.queue.last_fault()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn model(&self) -> SensorModel {
        self.model
    }

    pub fn channel(&self) -> SensorChannel {
        self.channel
    }
}
