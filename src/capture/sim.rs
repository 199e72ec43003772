//! Software frame grabber
//!
//! Stands in for the USB/FPGA hardware session: a capture task generates
//! gradient test frames for every active sensor at the configured rate and
//! pushes them to the attached sinks, while register writes, firmware paths
//! and AEC state are recorded for inspection. Serves the demo binary and the
//! tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::capture::frame::{Frame, SensorChannel};
use crate::capture::grabber::{
    DeviceFault, FirmwarePaths, FrameGrabber, FrameSink, GrabberError,
};
use crate::control::aec::AecState;
use crate::control::registers::RegisterWrite;
use crate::CaptureConfig;

/// State shared with the capture task.
struct Shared {
    sinks: RwLock<Vec<Arc<dyn FrameSink>>>,
    /// When set, frames carry 24-bit RGB instead of 8-bit raw output.
    colour: AtomicBool,
}

impl Shared {
    fn broadcast(&self, frame: &Frame) {
        let sinks = match self.sinks.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for sink in sinks.iter() {
            sink.on_frame(frame.clone());
        }
    }

    fn broadcast_fault(&self, fault: &DeviceFault) {
        let sinks = match self.sinks.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for sink in sinks.iter() {
            sink.on_fault(fault);
        }
    }
}

/// Everything the simulated hardware was told, shared with [`SimProbe`].
#[derive(Default)]
struct Recorded {
    writes: Mutex<Vec<RegisterWrite>>,
    aec: Mutex<Vec<AecState>>,
    firmware: Mutex<Option<FirmwarePaths>>,
}

/// Inspection handle onto a [`SimGrabber`], usable after the grabber itself
/// has been moved into a camera.
#[derive(Clone)]
pub struct SimProbe {
    recorded: Arc<Recorded>,
}

impl SimProbe {
    /// Register writes issued so far, oldest first.
    pub fn recorded_writes(&self) -> Vec<RegisterWrite> {
        self.recorded
            .writes
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    /// AEC state set most recently pushed to the grabber.
    pub fn applied_aec(&self) -> Vec<AecState> {
        self.recorded
            .aec
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    pub fn loaded_firmware(&self) -> Option<FirmwarePaths> {
        self.recorded.firmware.lock().ok().and_then(|f| f.clone())
    }
}

/// Simulated dual-sensor frame grabber.
pub struct SimGrabber {
    channel: SensorChannel,
    width: u32,
    height: u32,
    frame_period: Duration,
    /// Capture timestamp offset applied to sensor 1, modelling the skew
    /// between the two sensor readouts.
    channel_skew_us: u64,
    shared: Arc<Shared>,
    recorded: Arc<Recorded>,
    task: Option<JoinHandle<()>>,
}

impl SimGrabber {
    pub fn new(channel: SensorChannel, config: &CaptureConfig) -> Self {
        Self {
            channel,
            width: config.width,
            height: config.height,
            frame_period: Duration::from_micros(1_000_000 / u64::from(config.fps.max(1))),
            channel_skew_us: config.channel_skew_us,
            shared: Arc::new(Shared {
                sinks: RwLock::new(Vec::new()),
                colour: AtomicBool::new(true),
            }),
            recorded: Arc::new(Recorded::default()),
            task: None,
        }
    }

    pub fn probe(&self) -> SimProbe {
        SimProbe {
            recorded: Arc::clone(&self.recorded),
        }
    }

    /// Push a fault notification to every sink, as the hardware would on a
    /// capture exception.
    pub fn inject_fault(&self, description: impl Into<String>) {
        self.shared.broadcast_fault(&DeviceFault {
            description: description.into(),
        });
    }
}

impl FrameGrabber for SimGrabber {
    fn write_register(&mut self, write: &RegisterWrite) -> Result<(), GrabberError> {
        debug!(
            address = write.address,
            sensor_id = write.sensor_id,
            value = write.value,
            class = ?write.class,
            "register write"
        );
        if let Ok(mut writes) = self.recorded.writes.lock() {
            writes.push(write.clone());
        }
        Ok(())
    }

    fn load_firmware(&mut self, firmware: &FirmwarePaths) -> Result<(), GrabberError> {
        info!(
            fpga = %firmware.fpga_bitstream.display(),
            sensor = %firmware.sensor_firmware.display(),
            "loading firmware"
        );
        if let Ok(mut loaded) = self.recorded.firmware.lock() {
            *loaded = Some(firmware.clone());
        }
        Ok(())
    }

    fn apply_aec(&mut self, states: &[AecState]) -> Result<(), GrabberError> {
        debug!(count = states.len(), "applying AEC state set");
        if let Ok(mut aec) = self.recorded.aec.lock() {
            *aec = states.to_vec();
        }
        Ok(())
    }

    fn set_colour_reconstruction(&mut self, enabled: bool) -> Result<(), GrabberError> {
        self.shared.colour.store(enabled, Ordering::Relaxed);
        Ok(())
    }

    fn attach(&mut self, sink: Arc<dyn FrameSink>) {
        if let Ok(mut sinks) = self.shared.sinks.write() {
            sinks.push(sink);
        }
    }

    fn start_capture(&mut self) -> Result<(), GrabberError> {
        if self.task.is_some() {
            return Err(GrabberError::Session("capture already running".into()));
        }

        let shared = Arc::clone(&self.shared);
        let sensor_ids = self.channel.sensor_ids();
        let (width, height) = (self.width, self.height);
        let period = self.frame_period;
        let period_us = period.as_micros() as u64;
        let skew_us = self.channel_skew_us;

        info!(channel = ?self.channel, width, height, "starting simulated capture");
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut timestamp_us = 0u64;
            loop {
                ticker.tick().await;
                timestamp_us += period_us;
                let rgb = shared.colour.load(Ordering::Relaxed);
                for &sensor_id in sensor_ids {
                    let skew = skew_us * u64::from(sensor_id);
                    let frame =
                        synthetic_frame(sensor_id, width, height, rgb, timestamp_us + skew);
                    shared.broadcast(&frame);
                }
            }
        }));
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<(), GrabberError> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("simulated capture stopped");
        }
        Ok(())
    }
}

impl Drop for SimGrabber {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Deterministic gradient frame: pixel value depends on position and sensor
/// id, so the two channels are distinguishable in a viewer.
fn synthetic_frame(sensor_id: u8, width: u32, height: u32, rgb: bool, timestamp_us: u64) -> Frame {
    let bits_per_pixel: u8 = if rgb { 24 } else { 8 };
    let bytes_per_pixel = usize::from(bits_per_pixel) / 8;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * bytes_per_pixel);

    for y in 0..height {
        for x in 0..width {
            let value = ((x + y + u32::from(sensor_id) * 128) % 256) as u8;
            for _ in 0..bytes_per_pixel {
                pixels.push(value);
            }
        }
    }

    Frame {
        sensor_id,
        pixels: Bytes::from(pixels),
        width,
        height,
        bits_per_pixel,
        timestamp_us,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue::FrameQueue;

    fn config() -> CaptureConfig {
        CaptureConfig {
            width: 8,
            height: 8,
            fps: 1000,
            channel_skew_us: 100,
            firmware: None,
        }
    }

    #[test]
    fn synthetic_frames_are_well_formed() {
        let rgb = synthetic_frame(0, 8, 8, true, 42);
        assert!(rgb.is_well_formed());
        assert_eq!(rgb.bits_per_pixel, 24);
        assert_eq!(rgb.pixels.len(), 8 * 8 * 3);
        assert_eq!(rgb.timestamp_us, 42);

        let raw = synthetic_frame(1, 8, 8, false, 42);
        assert_eq!(raw.bits_per_pixel, 8);
        assert_eq!(raw.pixels.len(), 8 * 8);
    }

    #[test]
    fn register_writes_and_firmware_are_recorded() {
        use crate::control::registers::{RegisterClass, RegisterWrite};

        let mut grabber = SimGrabber::new(SensorChannel::Ch1, &config());
        let probe = grabber.probe();
        let write = RegisterWrite {
            address: 0x01,
            sensor_id: 0,
            value: 7,
            class: RegisterClass::Sensor,
        };
        grabber.write_register(&write).unwrap();
        assert_eq!(probe.recorded_writes(), vec![write]);

        let firmware = FirmwarePaths {
            fpga_bitstream: "fpga.bit".into(),
            sensor_firmware: "sensor.fw".into(),
        };
        grabber.load_firmware(&firmware).unwrap();
        assert_eq!(probe.loaded_firmware(), Some(firmware));
    }

    #[tokio::test]
    async fn capture_delivers_synchronized_pairs() {
        let mut grabber = SimGrabber::new(SensorChannel::Both, &config());
        let queue = Arc::new(FrameQueue::new(SensorChannel::Both, 20_000));
        grabber.attach(Arc::clone(&queue) as Arc<dyn FrameSink>);

        grabber.start_capture().unwrap();
        let mut output = None;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(2)).await;
            if let Some(latest) = queue.latest() {
                output = Some(latest);
                break;
            }
        }
        grabber.stop_capture().unwrap();

        let output = output.expect("pair within deadline");
        match output.as_ref() {
            crate::capture::frame::FrameOutput::Pair { left, right } => {
                assert_eq!(left.sensor_id, 0);
                assert_eq!(right.sensor_id, 1);
                assert_eq!(right.timestamp_us - left.timestamp_us, 100);
            }
            other => panic!("expected pair, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let mut grabber = SimGrabber::new(SensorChannel::Ch1, &config());
        grabber.start_capture().unwrap();
        assert!(grabber.start_capture().is_err());
        grabber.stop_capture().unwrap();
        // Restart after stop is fine.
        grabber.start_capture().unwrap();
        grabber.stop_capture().unwrap();
    }

    #[test]
    fn attached_queues_deliver_independently() {
        let mut grabber = SimGrabber::new(SensorChannel::Both, &config());
        let paired = Arc::new(FrameQueue::new(SensorChannel::Both, 20_000));
        let left_only = Arc::new(FrameQueue::new(SensorChannel::Ch1, 20_000));
        grabber.attach(Arc::clone(&paired) as Arc<dyn FrameSink>);
        grabber.attach(Arc::clone(&left_only) as Arc<dyn FrameSink>);

        // Feed both sinks directly, as the capture task would.
        grabber.shared.broadcast(&synthetic_frame(0, 8, 8, true, 1000));
        grabber.shared.broadcast(&synthetic_frame(1, 8, 8, true, 1100));

        // The dual queue promoted a pair; the single-channel queue kept its
        // own frame and rejected the other sensor's.
        assert!(matches!(
            paired.latest().as_deref(),
            Some(crate::capture::frame::FrameOutput::Pair { .. })
        ));
        assert!(matches!(
            left_only.latest().as_deref(),
            Some(crate::capture::frame::FrameOutput::Single(f)) if f.sensor_id == 0
        ));
        assert_eq!(left_only.stats().rejected, 1);
    }

    #[test]
    fn faults_reach_attached_sinks() {
        let mut grabber = SimGrabber::new(SensorChannel::Ch1, &config());
        let queue = Arc::new(FrameQueue::new(SensorChannel::Ch1, 20_000));
        grabber.attach(Arc::clone(&queue) as Arc<dyn FrameSink>);

        grabber.inject_fault("overcurrent on sensor 0");
        assert_eq!(
            queue.last_fault().map(|f| f.description),
            Some("overcurrent on sensor 0".into())
        );
    }
}
