//! Gemini dual-sensor camera demo
//!
//! Runs the full delivery path against the simulated grabber: configure
//! registers and AEC, start capture, stream synchronized pairs to a
//! consumer, print queue statistics on the way out.

use std::sync::Arc;

use color_eyre::Result;
use flume::bounded;
use tracing::{info, warn};

use gemini::camera::Camera;
use gemini::capture::{Frame, SensorChannel, SimGrabber};
use gemini::control::registers::SensorModel;
use gemini::Config;

const DEMO_FRAMES: usize = 40;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter("gemini=debug")
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Gemini launching...");

    let config = Config::default();
    gemini::CONFIG.store(Arc::new(config.clone()));

    let grabber = SimGrabber::new(SensorChannel::Both, &config.capture);
    let mut camera = Camera::new(
        SensorModel::Standard,
        SensorChannel::Both,
        Box::new(grabber),
        &config,
    )?;

    // Tune the sensors before streaming
    camera.set_gain(80)?;
    camera.set_offset(128)?;
    camera.set_exposure(120)?;
    camera.set_frame_rate(2000)?;
    camera.reconfigure_aec()?;
    camera.enable_aec()?;
    camera.enable_colour_reconstruction()?;

    // Forward delivered frames out of the capture thread
    let (tx, rx) = bounded::<Frame>(16);
    camera.subscribe_to_frames(move |frame| {
        if let Err(e) = tx.try_send(frame.clone()) {
            warn!("consumer lagging, frame not forwarded: {e}");
        }
    });

    camera.start_capture()?;
    info!("capture started");

    for _ in 0..DEMO_FRAMES {
        let frame = rx.recv_async().await?;
        info!(
            sensor_id = frame.sensor_id,
            width = frame.width,
            height = frame.height,
            bits_per_pixel = frame.bits_per_pixel,
            timestamp_us = frame.timestamp_us,
            "frame delivered"
        );
    }

    camera.stop_capture()?;
    let stats = camera.queue_stats();
    info!(
        received = stats.received,
        delivered = stats.delivered,
        overwritten = stats.overwritten,
        stale_dropped = stats.stale_dropped,
        malformed = stats.malformed,
        "capture stopped"
    );
    if let Some(fault) = camera.last_fault() {
        warn!(description = %fault.description, "device fault observed during run");
    }

    info!("Gemini shutting down");
    Ok(())
}
