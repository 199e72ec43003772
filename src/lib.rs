pub mod camera;
pub mod capture;
pub mod control;
pub mod pipeline;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::capture::grabber::FirmwarePaths;

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Sensor resolution, constant for a configured session.
    pub width: u32,
    pub height: u32,
    /// Nominal capture rate of the simulated source, frames per second.
    pub fps: u32,
    /// Readout skew applied to the second sensor's timestamps (simulated
    /// source only), microseconds.
    pub channel_skew_us: u64,
    /// Firmware images loaded into the grabber at session construction.
    pub firmware: Option<FirmwarePaths>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Acceptable cross-sensor capture skew for a synchronized pair,
    /// microseconds.
    pub tolerance_us: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                width: 320,
                height: 320,
                fps: 40,
                channel_skew_us: 500,
                firmware: None,
            },
            sync: SyncConfig {
                tolerance_us: 20_000,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, e.g. `gemini.toml`.
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = Config::default();
        assert!(config.capture.width > 0 && config.capture.height > 0);
        assert!(config.capture.fps > 0);
        assert_eq!(config.sync.tolerance_us, 20_000);
        assert!(config.capture.firmware.is_none());
    }

    #[test]
    fn config_round_trips_through_the_global() {
        let mut config = Config::default();
        config.sync.tolerance_us = 5_000;
        CONFIG.store(std::sync::Arc::new(config));
        assert_eq!(CONFIG.load().sync.tolerance_us, 5_000);
        CONFIG.store(std::sync::Arc::new(Config::default()));
    }
}
