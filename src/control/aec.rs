//! Automatic exposure control state
//!
//! The AEC algorithm itself runs inside the frame grabber; this module owns
//! the per-channel tuning state handed to it and the default tuning profile.

use crate::capture::frame::SensorChannel;

/// Region of interest the AEC averages brightness over, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub top: u32,
    pub left: u32,
    pub right: u32,
    pub bottom: u32,
}

/// Exposure bounds the loop steers within at one gain level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExposureThresholds {
    pub min: u16,
    pub low: u16,
    pub high: u16,
    pub max: u16,
}

/// Default tuning applied to every channel on reconfiguration.
pub const DEFAULT_TARGET_GREY: u16 = 560;
pub const DEFAULT_HYSTERESIS: u16 = 63;
pub const DEFAULT_STEP: u16 = 2;
pub const DEFAULT_ROI: Roi = Roi {
    top: 64,
    left: 64,
    right: 256,
    bottom: 256,
};

/// Exposure steering bounds per gain level 0..=3. Higher gain amplifies the
/// signal, so the loop is given a narrower exposure band to work in.
pub const DEFAULT_THRESHOLDS: [ExposureThresholds; 4] = [
    ExposureThresholds { min: 1, low: 24, high: 230, max: 249 },
    ExposureThresholds { min: 1, low: 16, high: 210, max: 245 },
    ExposureThresholds { min: 1, low: 8, high: 190, max: 240 },
    ExposureThresholds { min: 1, low: 4, high: 170, max: 235 },
];

/// Per-channel AEC tuning state. One instance exists per active sensor,
/// rebuilt on every reconfiguration and pushed to the grabber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AecState {
    pub sensor_id: u8,
    pub enabled: bool,
    pub target_grey: u16,
    pub hysteresis: u16,
    pub step: u16,
    pub roi: Roi,
    /// Indexed by gain level 0..=3.
    pub thresholds: [ExposureThresholds; 4],
}

impl AecState {
    /// Default tuning profile for one sensor, initially disabled.
    pub fn with_defaults(sensor_id: u8) -> Self {
        Self {
            sensor_id,
            enabled: false,
            target_grey: DEFAULT_TARGET_GREY,
            hysteresis: DEFAULT_HYSTERESIS,
            step: DEFAULT_STEP,
            roi: DEFAULT_ROI,
            thresholds: DEFAULT_THRESHOLDS,
        }
    }
}

/// Owns the AEC states of a camera session.
///
/// The set holds zero, one or two entries keyed by sensor id. Reconfiguring
/// replaces the whole set, so repeated calls never grow it.
#[derive(Debug, Default)]
pub struct AecController {
    states: Vec<AecState>,
}

impl AecController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild one default-tuned state per sensor active in `channel` and
    /// return the new set for handing to the grabber.
    pub fn reconfigure(&mut self, channel: SensorChannel) -> &[AecState] {
        self.states = channel
            .sensor_ids()
            .iter()
            .map(|&id| AecState::with_defaults(id))
            .collect();
        &self.states
    }

    /// Flip the enabled flag on every existing state, leaving the tuning
    /// untouched. Without prior reconfiguration there is nothing to flip
    /// and the call is a no-op.
    pub fn set_enabled(&mut self, enabled: bool) -> &[AecState] {
        for state in &mut self.states {
            state.enabled = enabled;
        }
        &self.states
    }

    pub fn states(&self) -> &[AecState] {
        &self.states
    }

    pub fn is_configured(&self) -> bool {
        !self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconfigure_builds_one_state_per_channel() {
        let mut aec = AecController::new();
        let states = aec.reconfigure(SensorChannel::Both);
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].sensor_id, 0);
        assert_eq!(states[1].sensor_id, 1);
        assert!(states.iter().all(|s| !s.enabled));
        assert!(states.iter().all(|s| s.target_grey == 560));
        assert!(states.iter().all(|s| s.roi == DEFAULT_ROI));

        let mut aec = AecController::new();
        let states = aec.reconfigure(SensorChannel::Ch2);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].sensor_id, 1);
    }

    #[test]
    fn reconfigure_replaces_instead_of_appending() {
        let mut aec = AecController::new();
        aec.reconfigure(SensorChannel::Both);
        aec.set_enabled(true);
        let states = aec.reconfigure(SensorChannel::Both);
        // Fresh states: still two of them, defaults restored
        assert_eq!(states.len(), 2);
        assert!(states.iter().all(|s| !s.enabled));
    }

    #[test]
    fn toggling_before_reconfigure_is_a_noop() {
        let mut aec = AecController::new();
        assert!(aec.set_enabled(true).is_empty());
        assert!(!aec.is_configured());
    }

    #[test]
    fn toggling_preserves_tuning() {
        let mut aec = AecController::new();
        aec.reconfigure(SensorChannel::Ch1);
        let states = aec.set_enabled(true);
        assert!(states[0].enabled);
        assert_eq!(states[0].hysteresis, DEFAULT_HYSTERESIS);
        assert_eq!(states[0].thresholds, DEFAULT_THRESHOLDS);
        let states = aec.set_enabled(false);
        assert!(!states[0].enabled);
    }
}
