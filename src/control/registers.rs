//! Sensor register encoding with per-model range validation
//!
//! Control values are validated against the active sensor model before any
//! write is produced, so a rejected call never reaches the hardware.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::frame::SensorChannel;

/// Size classes of the miniature sensor family. The models share the gain
/// and offset registers but differ in exposure range and in how the frame
/// rate is programmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorModel {
    Standard,
    Mini,
    Micro,
}

/// Tunable register groups exposed to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    Gain,
    Offset,
    Exposure,
    FrameRate,
}

/// Whether a write targets a register on the sensor die or on the grabber
/// FPGA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
    Sensor,
    Grabber,
}

/// One addressed register write, ready to hand to the frame grabber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterWrite {
    pub address: u16,
    /// Sensor the write is addressed to (0 or 1).
    pub sensor_id: u8,
    pub value: u16,
    pub class: RegisterClass,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("{register:?} value {value} out of range {min}..={max} for {model:?}")]
    OutOfRange {
        register: RegisterKind,
        model: SensorModel,
        value: u16,
        min: u16,
        max: u16,
    },
}

// Sensor-die register map, identical across models.
const REG_GAIN: u16 = 0x01;
const REG_OFFSET: u16 = 0x02;
const REG_EXPOSURE: u16 = 0x03;
// Mini/Micro select the frame rate through an on-sensor divisor; Standard
// programs a frame period register on the grabber FPGA instead.
const REG_RATE_DIVISOR: u16 = 0x04;
const REG_FPGA_FRAME_PERIOD: u16 = 0x10;

/// Inclusive valid range of `kind` on `model`, plus the target address and
/// register class.
const fn table_entry(model: SensorModel, kind: RegisterKind) -> (u16, u16, u16, RegisterClass) {
    match (kind, model) {
        (RegisterKind::Gain, _) => (0, 160, REG_GAIN, RegisterClass::Sensor),
        (RegisterKind::Offset, _) => (0, 255, REG_OFFSET, RegisterClass::Sensor),
        (RegisterKind::Exposure, SensorModel::Standard) => {
            (1, 249, REG_EXPOSURE, RegisterClass::Sensor)
        }
        (RegisterKind::Exposure, SensorModel::Mini) => {
            (0, 159, REG_EXPOSURE, RegisterClass::Sensor)
        }
        (RegisterKind::Exposure, SensorModel::Micro) => {
            (0, 99, REG_EXPOSURE, RegisterClass::Sensor)
        }
        // Hundredths of FPS, written to the grabber rather than the sensor.
        (RegisterKind::FrameRate, SensorModel::Standard) => {
            (1600, 2400, REG_FPGA_FRAME_PERIOD, RegisterClass::Grabber)
        }
        (RegisterKind::FrameRate, SensorModel::Mini) => {
            (0, 5, REG_RATE_DIVISOR, RegisterClass::Sensor)
        }
        (RegisterKind::FrameRate, SensorModel::Micro) => {
            (0, 2, REG_RATE_DIVISOR, RegisterClass::Sensor)
        }
    }
}

/// Validate `value` for `kind` on `model` and encode one write per sensor
/// active in `channel`.
///
/// Validation happens before any write is emitted; an out-of-range value
/// produces no writes at all.
pub fn encode(
    model: SensorModel,
    kind: RegisterKind,
    value: u16,
    channel: SensorChannel,
) -> Result<Vec<RegisterWrite>, RegisterError> {
    let (min, max, address, class) = table_entry(model, kind);
    if value < min || value > max {
        return Err(RegisterError::OutOfRange {
            register: kind,
            model,
            value,
            min,
            max,
        });
    }

    Ok(channel
        .sensor_ids()
        .iter()
        .map(|&sensor_id| RegisterWrite {
            address,
            sensor_id,
            value,
            class,
        })
        .collect())
}
